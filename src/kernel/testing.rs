//! Kernel wrapper for tests: records lifecycle calls, injects failures

use super::{EntryPoint, Kernel, ThreadRequest};
use crate::error::{BenchError, Result, Step};
use crate::types::Priority;

/// One recorded call: step and thread name
pub type Call = (Step, String);

pub struct RecordingKernel<K: Kernel> {
    inner: K,
    calls: Vec<Call>,
    fail_at: Option<(Step, usize)>,
}

/// Recorded thread with the name it was allocated under
#[derive(Debug)]
pub struct Recorded<T> {
    name: String,
    thread: T,
}

impl<K: Kernel> RecordingKernel<K> {
    pub fn new(inner: K) -> Self {
        Self {
            inner,
            calls: Vec::new(),
            fail_at: None,
        }
    }

    /// Fail the `nth` (0-based) call of `step` with a configuration failure
    pub fn failing_at(mut self, step: Step, nth: usize) -> Self {
        self.fail_at = Some((step, nth));
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn count(&self, step: Step, name: &str) -> usize {
        self.calls.iter().filter(|(s, n)| *s == step && n == name).count()
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }

    fn record(&mut self, step: Step, name: &str) -> Result<()> {
        let seen = self.calls.iter().filter(|(s, _)| *s == step).count();
        self.calls.push((step, name.to_string()));
        match self.fail_at {
            Some((fail_step, nth)) if fail_step == step && nth == seen => {
                Err(BenchError::rejected(step, name, "injected failure"))
            }
            _ => Ok(()),
        }
    }
}

impl<K: Kernel> Kernel for RecordingKernel<K> {
    type Thread = Recorded<K::Thread>;

    fn allocate_thread_resources(&mut self, request: &ThreadRequest) -> Result<Self::Thread> {
        self.record(Step::AllocateThread, &request.name)?;
        let thread = self.inner.allocate_thread_resources(request)?;
        Ok(Recorded {
            name: request.name.clone(),
            thread,
        })
    }

    fn configure_priority(&mut self, thread: &mut Self::Thread, priority: Priority) -> Result<()> {
        self.record(Step::ConfigurePriority, &thread.name)?;
        self.inner.configure_priority(&mut thread.thread, priority)
    }

    fn write_initial_registers(
        &mut self,
        thread: &mut Self::Thread,
        entry: EntryPoint,
    ) -> Result<()> {
        self.record(Step::WriteRegisters, &thread.name)?;
        self.inner.write_initial_registers(&mut thread.thread, entry)
    }

    fn start(&mut self, thread: &mut Self::Thread) -> Result<()> {
        self.record(Step::Start, &thread.name)?;
        self.inner.start(&mut thread.thread)
    }

    fn suspend(&mut self, thread: &mut Self::Thread) -> Result<()> {
        self.record(Step::Suspend, &thread.name)?;
        self.inner.suspend(&mut thread.thread)
    }

    fn release(&mut self, thread: Self::Thread) -> Result<()> {
        // Release always reaches the inner kernel so no thread is leaked
        let recorded = self.record(Step::Release, &thread.name);
        self.inner.release(thread.thread)?;
        recorded
    }

    fn enforces_priorities(&self) -> bool {
        self.inner.enforces_priorities()
    }
}
