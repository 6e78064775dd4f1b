//! Worker thread bodies
//!
//! The low-priority producer signals `wake` `loop_count` times between two
//! clock reads. Every signal is expected to be preempted by the
//! high-priority consumer, so the delta accumulates `loop_count` round
//! trips plus a fixed overhead.

use std::hint::black_box;
use std::sync::atomic::{compiler_fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::CycleClock;
use crate::sync::{Notification, SuspendFlag, Wake};
use crate::types::LatencySample;

/// Single-writer, single-reader slot for one run's sample
#[derive(Debug, Clone, Default)]
pub struct SampleSlot {
    inner: Arc<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    value: AtomicU64,
    written: AtomicBool,
}

impl SampleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, sample: LatencySample) {
        self.inner.value.store(sample, Ordering::Relaxed);
        self.inner.written.store(true, Ordering::Release);
    }

    /// Read and clear; `None` if nothing was written since the last take
    pub fn take(&self) -> Option<LatencySample> {
        if self.inner.written.swap(false, Ordering::Acquire) {
            Some(self.inner.value.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

pub struct ProducerArgs<C> {
    pub wake: Notification,
    pub done: Notification,
    pub slot: SampleSlot,
    pub loop_count: u64,
    pub clock: C,
}

pub struct ConsumerArgs {
    pub wake: Notification,
}

/// Signal `wake` `loop_count` times between two clock reads.
///
/// Kept out of line with fences on both sides so neither read can move
/// into or out of the signal sequence.
#[inline(never)]
pub fn timed_section<C: CycleClock>(
    clock: &C,
    wake: &Notification,
    loop_count: u64,
) -> LatencySample {
    let loops = black_box(loop_count);

    let start = clock.read();
    compiler_fence(Ordering::SeqCst);

    for _ in 0..loops {
        wake.signal();
    }

    compiler_fence(Ordering::SeqCst);
    let end = clock.read();

    end.wrapping_sub(start)
}

pub fn low_priority_producer<C: CycleClock>(args: ProducerArgs<C>) {
    let sample = timed_section(&args.clock, &args.wake, args.loop_count);
    args.slot.write(sample);
    args.done.signal();
}

/// Wait on `wake` until suspended. Returns the number of wake-ups seen.
pub fn high_priority_consumer(args: ConsumerArgs, suspend: SuspendFlag) -> u64 {
    let mut woken = 0;
    while args.wake.wait_or_suspend(&suspend) == Wake::Signalled {
        woken += 1;
    }
    woken
}
