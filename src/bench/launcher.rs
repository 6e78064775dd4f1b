//! Thread launcher
//!
//! Builds both workers from scratch for every run and tears them down
//! after it, so each sample starts from the same stack and register state.

use tracing::{debug, warn};

use super::workers::{
    high_priority_consumer, low_priority_producer, ConsumerArgs, ProducerArgs, SampleSlot,
};
use crate::clock::CycleClock;
use crate::config::ThreadConfig;
use crate::error::Result;
use crate::kernel::{EntryPoint, Kernel};
use crate::sync::{Notification, NotificationCounters, SuspendFlag};
use crate::types::RunParameters;

/// Both workers of one run
#[derive(Debug)]
pub struct RunningPair<T> {
    pub producer: T,
    pub consumer: T,
}

/// Wake channel activity of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub signalled: u64,
    pub consumed: u64,
    /// Signals absorbed into an already pending notification
    pub coalesced: u64,
}

impl RunStats {
    /// Signals still pending when the consumer was suspended (0 or 1)
    pub fn left_pending(&self) -> u64 {
        self.signalled
            .saturating_sub(self.coalesced)
            .saturating_sub(self.consumed)
    }
}

pub struct ThreadLauncher<K: Kernel, C: CycleClock> {
    kernel: K,
    clock: C,
    threads: ThreadConfig,
    wake: Notification,
    done: Notification,
    slot: SampleSlot,
    wake_mark: NotificationCounters,
}

impl<K: Kernel, C: CycleClock> ThreadLauncher<K, C> {
    pub fn new(kernel: K, clock: C, threads: ThreadConfig) -> Self {
        Self {
            kernel,
            clock,
            threads,
            wake: Notification::new(),
            done: Notification::new(),
            slot: SampleSlot::new(),
            wake_mark: NotificationCounters::default(),
        }
    }

    /// Use existing notification objects instead of fresh ones
    pub fn with_notifications(mut self, wake: Notification, done: Notification) -> Self {
        self.wake = wake;
        self.done = done;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn threads(&self) -> &ThreadConfig {
        &self.threads
    }

    pub fn wake(&self) -> &Notification {
        &self.wake
    }

    /// Signalled once per run by the producer after its timed section
    pub fn done(&self) -> &Notification {
        &self.done
    }

    pub fn slot(&self) -> &SampleSlot {
        &self.slot
    }

    /// Construct, configure and start both workers for one run.
    ///
    /// The consumer is made runnable first: it must already be waiting when
    /// the producer's first signal arrives.
    pub fn start_run(&mut self, params: RunParameters) -> Result<RunningPair<K::Thread>> {
        // Leftovers of an earlier run must not leak into this one
        self.wake.poll();
        self.done.poll();
        self.slot.take();
        self.wake_mark = self.wake.counters();

        let producer = self
            .kernel
            .allocate_thread_resources(&self.threads.request(&self.threads.producer))?;
        let consumer = match self
            .kernel
            .allocate_thread_resources(&self.threads.request(&self.threads.consumer))
        {
            Ok(consumer) => consumer,
            Err(e) => {
                self.abandon([producer]);
                return Err(e);
            }
        };

        let mut pair = RunningPair { producer, consumer };
        if let Err(e) = self.load_and_start(&mut pair, params) {
            self.abandon([pair.consumer, pair.producer]);
            return Err(e);
        }

        debug!(loop_count = params.loop_count, "Run started");
        Ok(pair)
    }

    fn load_and_start(
        &mut self,
        pair: &mut RunningPair<K::Thread>,
        params: RunParameters,
    ) -> Result<()> {
        self.kernel
            .configure_priority(&mut pair.producer, self.threads.producer.priority)?;
        self.kernel
            .configure_priority(&mut pair.consumer, self.threads.consumer.priority)?;

        let producer_args = ProducerArgs {
            wake: self.wake.clone(),
            done: self.done.clone(),
            slot: self.slot.clone(),
            loop_count: params.loop_count,
            clock: self.clock.clone(),
        };
        let producer_entry: EntryPoint =
            Box::new(move |_suspend: SuspendFlag| low_priority_producer(producer_args));
        self.kernel
            .write_initial_registers(&mut pair.producer, producer_entry)?;

        let consumer_args = ConsumerArgs {
            wake: self.wake.clone(),
        };
        let consumer_entry: EntryPoint = Box::new(move |suspend: SuspendFlag| {
            high_priority_consumer(consumer_args, suspend);
        });
        self.kernel
            .write_initial_registers(&mut pair.consumer, consumer_entry)?;

        self.kernel.start(&mut pair.consumer)?;
        self.kernel.start(&mut pair.producer)?;
        Ok(())
    }

    /// Halt both workers and give their resources back
    pub fn stop_run(&mut self, pair: RunningPair<K::Thread>) -> Result<RunStats> {
        let RunningPair {
            mut producer,
            mut consumer,
        } = pair;

        let suspended = self
            .kernel
            .suspend(&mut consumer)
            .and_then(|_| self.kernel.suspend(&mut producer));
        if let Err(e) = suspended {
            self.abandon([consumer, producer]);
            return Err(e);
        }

        let released = self.kernel.release(consumer);
        self.kernel.release(producer)?;
        released?;

        let delta = self.wake.counters().since(&self.wake_mark);
        Ok(RunStats {
            signalled: delta.signalled,
            consumed: delta.consumed,
            coalesced: delta.coalesced,
        })
    }

    /// Release threads on the way to a fatal error
    fn abandon<const N: usize>(&mut self, threads: [K::Thread; N]) {
        for thread in threads {
            if let Err(e) = self.kernel.release(thread) {
                warn!("Release while aborting failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::StepClock;
    use crate::error::{BenchError, Step};
    use crate::kernel::testing::RecordingKernel;
    use crate::kernel::{HostKernel, SchedPolicy};

    fn launcher(
        kernel: RecordingKernel<HostKernel>,
    ) -> ThreadLauncher<RecordingKernel<HostKernel>, StepClock> {
        ThreadLauncher::new(kernel, StepClock::new(10), ThreadConfig::default())
    }

    fn host() -> RecordingKernel<HostKernel> {
        RecordingKernel::new(HostKernel::new(SchedPolicy::Inherit, None))
    }

    #[test]
    fn test_one_run_builds_and_destroys_each_worker_once() {
        let mut launcher = launcher(host());
        let pair = launcher.start_run(RunParameters { loop_count: 3 }).unwrap();
        launcher.done().wait();
        let stats = launcher.stop_run(pair).unwrap();

        assert_eq!(launcher.slot().take(), Some(10));
        assert_eq!(stats.signalled, 3);
        assert_eq!(
            stats.consumed + stats.coalesced + stats.left_pending(),
            stats.signalled
        );
        assert!(stats.left_pending() <= 1);

        let kernel = launcher.kernel();
        for name in ["Low prio", "High prio"] {
            for step in [
                Step::AllocateThread,
                Step::ConfigurePriority,
                Step::WriteRegisters,
                Step::Start,
                Step::Suspend,
                Step::Release,
            ] {
                assert_eq!(kernel.count(step, name), 1, "{step} of {name}");
            }
        }
        assert_eq!(kernel.inner().stats().live(), 0);
    }

    #[test]
    fn test_consumer_starts_before_producer_and_is_suspended_first() {
        let mut launcher = launcher(host());
        let pair = launcher.start_run(RunParameters { loop_count: 1 }).unwrap();
        launcher.done().wait();
        launcher.stop_run(pair).unwrap();

        let order = |step: Step| -> Vec<String> {
            launcher
                .kernel()
                .calls()
                .iter()
                .filter(|(s, _)| *s == step)
                .map(|(_, name)| name.clone())
                .collect()
        };
        assert_eq!(order(Step::Start), vec!["High prio", "Low prio"]);
        assert_eq!(order(Step::Suspend), vec!["High prio", "Low prio"]);
        assert_eq!(order(Step::ConfigurePriority), vec!["Low prio", "High prio"]);
    }

    #[test]
    fn test_failed_configuration_releases_both_threads() {
        let mut launcher = launcher(host().failing_at(Step::ConfigurePriority, 1));
        let err = launcher.start_run(RunParameters { loop_count: 1 }).unwrap_err();
        assert!(matches!(
            err,
            BenchError::ConfigurationFailure {
                step: Step::ConfigurePriority,
                ..
            }
        ));
        let stats = launcher.kernel().inner().stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.live(), 0);
        assert_eq!(stats.started, 0);
    }

    #[test]
    fn test_failed_allocation_releases_producer() {
        let mut launcher = launcher(host().failing_at(Step::AllocateThread, 1));
        assert!(launcher.start_run(RunParameters { loop_count: 1 }).is_err());
        assert_eq!(launcher.kernel().inner().stats().live(), 0);
    }

    #[test]
    fn test_signal_pending_at_stop_is_not_coalesced() {
        let stats = RunStats {
            signalled: 1,
            consumed: 0,
            coalesced: 0,
        };
        assert_eq!(stats.left_pending(), 1);

        let stats = RunStats {
            signalled: 5,
            consumed: 2,
            coalesced: 2,
        };
        assert_eq!(stats.left_pending(), 1);
    }

    #[test]
    fn test_stale_done_signal_is_drained() {
        let mut launcher = launcher(host());
        launcher.done().signal();
        launcher.slot().write(999);

        let pair = launcher.start_run(RunParameters { loop_count: 2 }).unwrap();
        launcher.done().wait();
        launcher.stop_run(pair).unwrap();
        assert_eq!(launcher.slot().take(), Some(10));
    }
}
