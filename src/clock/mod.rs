//! Cycle clock
//!
//! A cheap read of a monotonically increasing hardware counter. Callers
//! bracket the timed section with two reads and fence around it.

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
use std::time::Instant;

/// Monotonic cycle counter
pub trait CycleClock: Clone + Send + Sync + 'static {
    fn read(&self) -> u64;
}

/// Hardware cycle counter of the current CPU
///
/// `rdtsc` on x86_64, the virtual counter on aarch64, nanoseconds since
/// creation anywhere else.
#[derive(Debug, Clone, Copy)]
pub struct HardwareClock {
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    origin: Instant,
}

impl HardwareClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
            origin: Instant::now(),
        }
    }
}

impl Default for HardwareClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock for HardwareClock {
    #[inline(always)]
    fn read(&self) -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            unsafe { std::arch::x86_64::_rdtsc() }
        }
        #[cfg(target_arch = "aarch64")]
        {
            let cycles: u64;
            unsafe {
                std::arch::asm!(
                    "mrs {}, cntvct_el0",
                    out(reg) cycles,
                    options(nomem, nostack, preserves_flags)
                );
            }
            cycles
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            self.origin.elapsed().as_nanos() as u64
        }
    }
}
