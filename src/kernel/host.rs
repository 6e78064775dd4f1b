//! Host kernel: workers as OS threads
//!
//! A thread is spawned at allocation and parks on a start gate, so that
//! priority and entry point are in place before it executes any worker
//! code. Suspension raises the thread's [`SuspendFlag`]; release joins it.

use core_affinity::CoreId;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::sched::{self, SchedPolicy};
use super::{EntryPoint, Kernel, ThreadRequest, ThreadState};
use crate::error::{BenchError, Result, Step};
use crate::sync::{Notification, SuspendFlag};
use crate::types::Priority;

/// Smallest stack a host thread is spawned with. Unwinding and backtrace
/// printing run on the worker's own stack.
pub const MIN_HOST_STACK: usize = 256 * 1024;

/// Hand-off between the controller and a parked thread
#[derive(Default)]
struct Launch {
    ready: Notification,
    gate: Notification,
    pinned: AtomicBool,
    entry: Mutex<Option<EntryPoint>>,
}

impl Launch {
    /// Let the thread run off the end without executing an entry point
    fn discard(&self) {
        self.entry.lock().take();
        self.gate.signal();
    }
}

pub struct HostThread {
    name: String,
    state: ThreadState,
    priority: Priority,
    platform_priority: Option<i32>,
    stack_size: usize,
    suspend: SuspendFlag,
    launch: Arc<Launch>,
    handle: Option<JoinHandle<()>>,
}

impl HostThread {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Priority in the platform's native range, when a policy applied one
    pub fn platform_priority(&self) -> Option<i32> {
        self.platform_priority
    }

    /// Stack reserved for the thread, TLS included
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    fn expect_state(&self, step: Step, expected: ThreadState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BenchError::InvalidThreadState {
                thread: self.name.clone(),
                step,
                expected: expected.as_str(),
                found: self.state.as_str(),
            })
        }
    }
}

impl std::fmt::Debug for HostThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostThread")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("priority", &self.priority)
            .field("platform_priority", &self.platform_priority)
            .field("stack_size", &self.stack_size)
            .finish()
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        // Dropped without release: unblock and detach
        if self.handle.take().is_some() {
            self.suspend.raise();
            self.launch.discard();
        }
    }
}

/// Lifecycle counters of a [`HostKernel`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostKernelStats {
    pub allocated: u64,
    pub started: u64,
    pub suspended: u64,
    pub released: u64,
}

impl HostKernelStats {
    /// Threads allocated and not yet released
    pub fn live(&self) -> u64 {
        self.allocated - self.released
    }
}

#[derive(Debug)]
pub struct HostKernel {
    policy: SchedPolicy,
    core: Option<CoreId>,
    stats: HostKernelStats,
}

impl HostKernel {
    pub fn new(policy: SchedPolicy, cpu_core: Option<usize>) -> Self {
        Self {
            policy,
            core: cpu_core.map(|id| CoreId { id }),
            stats: HostKernelStats::default(),
        }
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    pub fn stats(&self) -> HostKernelStats {
        self.stats
    }
}

fn priority_hint(err: io::Error) -> String {
    if err.kind() == io::ErrorKind::PermissionDenied {
        format!(
            "{err}; grant CAP_SYS_NICE (`setcap cap_sys_nice+ep <binary>`) \
             or opt into the inherit policy"
        )
    } else {
        err.to_string()
    }
}

impl Kernel for HostKernel {
    type Thread = HostThread;

    fn allocate_thread_resources(&mut self, request: &ThreadRequest) -> Result<HostThread> {
        let name = request.name.as_str();
        if request.stack_size == 0 {
            return Err(BenchError::exhausted(Step::AllocateStack, name, "zero-sized stack"));
        }
        // glibc carves static TLS out of the thread's stack mapping
        let requested = request.stack_size.checked_add(request.tls_size).ok_or_else(|| {
            BenchError::exhausted(Step::AllocateStack, name, "stack + TLS size overflows")
        })?;
        let stack_size = requested.max(MIN_HOST_STACK);
        if stack_size != requested {
            debug!(
                thread = name,
                requested,
                stack_size,
                "Stack raised to the host minimum"
            );
        }

        let launch = Arc::new(Launch::default());
        let suspend = SuspendFlag::new();
        let core = self.core;

        let handle = thread::Builder::new()
            .name(request.name.clone())
            .stack_size(stack_size)
            .spawn({
                let launch = launch.clone();
                let suspend = suspend.clone();
                move || {
                    if let Some(core) = core {
                        launch
                            .pinned
                            .store(core_affinity::set_for_current(core), Ordering::SeqCst);
                    }
                    launch.ready.signal();
                    launch.gate.wait();

                    let entry = launch.entry.lock().take();
                    if let Some(entry) = entry {
                        entry(suspend);
                    }
                }
            })
            .map_err(|e| BenchError::exhausted(Step::AllocateThread, name, e))?;

        self.stats.allocated += 1;
        let thread = HostThread {
            name: request.name.clone(),
            state: ThreadState::Constructed,
            priority: request.priority,
            platform_priority: None,
            stack_size,
            suspend,
            launch,
            handle: Some(handle),
        };

        thread.launch.ready.wait();
        if let Some(core) = core {
            if !thread.launch.pinned.load(Ordering::SeqCst) {
                let reason = format!("core {} is not available", core.id);
                if self.policy == SchedPolicy::Fifo {
                    self.release(thread)?;
                    return Err(BenchError::rejected(Step::PinCore, name, reason));
                }
                warn!(thread = name, "Pinning failed, {}", reason);
            }
        }

        debug!(
            thread = name,
            stack_size,
            budget_us = request.budget.as_micros() as u64,
            "Thread allocated"
        );
        Ok(thread)
    }

    fn configure_priority(&mut self, thread: &mut HostThread, priority: Priority) -> Result<()> {
        thread.expect_state(Step::ConfigurePriority, ThreadState::Constructed)?;
        let handle = thread.handle.as_ref().ok_or_else(|| {
            BenchError::rejected(Step::ConfigurePriority, &thread.name, "thread has no handle")
        })?;

        thread.platform_priority = sched::apply(handle, self.policy, priority).map_err(|e| {
            BenchError::rejected(Step::ConfigurePriority, &thread.name, priority_hint(e))
        })?;
        thread.priority = priority;
        thread.state = ThreadState::Configured;
        Ok(())
    }

    fn write_initial_registers(
        &mut self,
        thread: &mut HostThread,
        entry: EntryPoint,
    ) -> Result<()> {
        thread.expect_state(Step::WriteRegisters, ThreadState::Configured)?;
        *thread.launch.entry.lock() = Some(entry);
        thread.state = ThreadState::Loaded;
        Ok(())
    }

    fn start(&mut self, thread: &mut HostThread) -> Result<()> {
        thread.expect_state(Step::Start, ThreadState::Loaded)?;
        thread.launch.gate.signal();
        thread.state = ThreadState::Runnable;
        self.stats.started += 1;
        Ok(())
    }

    fn suspend(&mut self, thread: &mut HostThread) -> Result<()> {
        thread.expect_state(Step::Suspend, ThreadState::Runnable)?;
        thread.suspend.raise();
        thread.state = ThreadState::Suspended;
        self.stats.suspended += 1;
        Ok(())
    }

    fn release(&mut self, mut thread: HostThread) -> Result<()> {
        let handle = thread.handle.take().ok_or_else(|| {
            BenchError::rejected(Step::Release, &thread.name, "thread has no handle")
        })?;

        if thread.state < ThreadState::Runnable {
            thread.launch.discard();
        }
        thread.suspend.raise();

        let joined = handle.join();
        self.stats.released += 1;
        joined.map_err(|_| BenchError::rejected(Step::Release, &thread.name, "worker panicked"))
    }

    fn enforces_priorities(&self) -> bool {
        self.policy == SchedPolicy::Fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Wake;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    fn request(name: &str, priority: u8) -> ThreadRequest {
        ThreadRequest {
            name: name.to_string(),
            priority: Priority(priority),
            stack_size: 16 * 1024,
            tls_size: 4 * 1024,
            budget: Duration::from_secs(100),
        }
    }

    #[test]
    fn test_full_lifecycle_runs_entry_once() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let runs = Arc::new(AtomicU64::new(0));
        let done = Notification::new();

        let mut thread = kernel.allocate_thread_resources(&request("worker", 200)).unwrap();
        assert_eq!(thread.state(), ThreadState::Constructed);
        kernel.configure_priority(&mut thread, Priority(200)).unwrap();
        let entry: EntryPoint = {
            let (runs, done) = (runs.clone(), done.clone());
            Box::new(move |_suspend: SuspendFlag| {
                runs.fetch_add(1, Ordering::SeqCst);
                done.signal();
            })
        };
        kernel.write_initial_registers(&mut thread, entry).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        kernel.start(&mut thread).unwrap();
        done.wait();
        kernel.suspend(&mut thread).unwrap();
        kernel.release(thread).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let stats = kernel.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.live(), 0);
    }

    #[test]
    fn test_start_before_load_is_rejected() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let mut thread = kernel.allocate_thread_resources(&request("worker", 1)).unwrap();
        let err = kernel.start(&mut thread).unwrap_err();
        assert_eq!(err.step(), Some(Step::Start));
        kernel.release(thread).unwrap();
    }

    #[test]
    fn test_release_before_start_skips_entry() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let ran = Arc::new(AtomicBool::new(false));
        let mut thread = kernel.allocate_thread_resources(&request("worker", 1)).unwrap();
        kernel.configure_priority(&mut thread, Priority(1)).unwrap();
        let entry: EntryPoint = {
            let ran = ran.clone();
            Box::new(move |_: SuspendFlag| ran.store(true, Ordering::SeqCst))
        };
        kernel.write_initial_registers(&mut thread, entry).unwrap();
        kernel.release(thread).unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_suspend_stops_blocked_worker() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let wake = Notification::new();
        let mut thread = kernel.allocate_thread_resources(&request("waiter", 255)).unwrap();
        kernel.configure_priority(&mut thread, Priority(255)).unwrap();
        let entry: EntryPoint = {
            let wake = wake.clone();
            Box::new(move |suspend: SuspendFlag| {
                while wake.wait_or_suspend(&suspend) == Wake::Signalled {}
            })
        };
        kernel.write_initial_registers(&mut thread, entry).unwrap();
        kernel.start(&mut thread).unwrap();
        wake.signal();

        kernel.suspend(&mut thread).unwrap();
        assert_eq!(thread.state(), ThreadState::Suspended);
        kernel.release(thread).unwrap();
    }

    #[test]
    fn test_zero_stack_is_exhaustion() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let mut req = request("worker", 1);
        req.stack_size = 0;
        let err = kernel.allocate_thread_resources(&req).unwrap_err();
        assert!(matches!(
            err,
            BenchError::ResourceExhaustion {
                step: Step::AllocateStack,
                ..
            }
        ));
        assert_eq!(kernel.stats().allocated, 0);
    }

    #[test]
    fn test_small_stack_is_raised_to_host_minimum() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let thread = kernel.allocate_thread_resources(&request("worker", 1)).unwrap();
        assert_eq!(thread.stack_size(), MIN_HOST_STACK);
        kernel.release(thread).unwrap();

        let mut req = request("worker", 1);
        req.stack_size = 2 * MIN_HOST_STACK;
        let thread = kernel.allocate_thread_resources(&req).unwrap();
        assert_eq!(thread.stack_size(), 2 * MIN_HOST_STACK + req.tls_size);
        kernel.release(thread).unwrap();
    }

    #[test]
    fn test_only_fifo_enforces_priorities() {
        assert!(!HostKernel::new(SchedPolicy::Inherit, None).enforces_priorities());
        assert!(HostKernel::new(SchedPolicy::Fifo, None).enforces_priorities());
    }

    #[test]
    fn test_panicking_worker_fails_release() {
        let mut kernel = HostKernel::new(SchedPolicy::Inherit, None);
        let mut thread = kernel.allocate_thread_resources(&request("worker", 1)).unwrap();
        kernel.configure_priority(&mut thread, Priority(1)).unwrap();
        kernel
            .write_initial_registers(&mut thread, Box::new(|_: SuspendFlag| panic!("boom")))
            .unwrap();
        kernel.start(&mut thread).unwrap();
        let err = kernel.release(thread).unwrap_err();
        assert_eq!(err.step(), Some(Step::Release));
    }
}
