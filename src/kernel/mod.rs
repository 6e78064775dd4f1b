//! Kernel interface
//!
//! The narrow set of calls the launcher needs from the execution
//! environment: allocate a thread, give it a priority, load its entry
//! point, make it runnable, stop it and hand its resources back. Every
//! call either succeeds or is fatal to the benchmark.

pub mod host;
pub mod sched;

#[cfg(test)]
pub mod testing;

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::sync::SuspendFlag;
use crate::types::Priority;

pub use host::{HostKernel, HostKernelStats, HostThread};
pub use sched::SchedPolicy;

/// Code a thread starts executing once runnable.
///
/// Arguments travel inside the closure. The flag is raised when the kernel
/// suspends the thread.
pub type EntryPoint = Box<dyn FnOnce(SuspendFlag) + Send + 'static>;

/// Resources requested for one worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRequest {
    pub name: String,
    pub priority: Priority,
    pub stack_size: usize,
    pub tls_size: usize,
    /// Scheduling budget per period, for kernels that need one
    pub budget: Duration,
}

/// Lifecycle of a kernel thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadState {
    /// Resources allocated, nothing runs
    Constructed,
    /// Priority applied
    Configured,
    /// Entry point installed
    Loaded,
    Runnable,
    Suspended,
}

impl ThreadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::Constructed => "constructed",
            ThreadState::Configured => "configured",
            ThreadState::Loaded => "loaded",
            ThreadState::Runnable => "runnable",
            ThreadState::Suspended => "suspended",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread management of the execution environment
pub trait Kernel {
    type Thread;

    fn allocate_thread_resources(&mut self, request: &ThreadRequest) -> Result<Self::Thread>;

    fn configure_priority(&mut self, thread: &mut Self::Thread, priority: Priority) -> Result<()>;

    fn write_initial_registers(
        &mut self,
        thread: &mut Self::Thread,
        entry: EntryPoint,
    ) -> Result<()>;

    fn start(&mut self, thread: &mut Self::Thread) -> Result<()>;

    fn suspend(&mut self, thread: &mut Self::Thread) -> Result<()>;

    fn release(&mut self, thread: Self::Thread) -> Result<()>;

    /// Whether configured priorities actually order the workers.
    ///
    /// Without enforcement the consumer is not guaranteed to preempt the
    /// producer and samples are not wake-up round trips.
    fn enforces_priorities(&self) -> bool {
        true
    }
}
