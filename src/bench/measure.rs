//! Measurement loop
//!
//! Runs the plan group by group. Every run gets freshly built workers; the
//! controller blocks on `done`, tears the workers down and only then files
//! the producer's sample into the table.

use serde::Serialize;
use std::hint::black_box;
use tracing::{debug, info, warn};

use super::launcher::ThreadLauncher;
use super::table::LatencyTable;
use crate::clock::{CycleClock, HardwareClock};
use crate::config::Config;
use crate::error::{BenchError, Result};
use crate::kernel::{HostKernel, Kernel};
use crate::types::ExperimentPlan;

/// Everything the measurement loop operates on
pub struct BenchmarkContext<K: Kernel, C: CycleClock> {
    plan: ExperimentPlan,
    launcher: ThreadLauncher<K, C>,
}

impl<K: Kernel, C: CycleClock> BenchmarkContext<K, C> {
    pub fn new(plan: ExperimentPlan, launcher: ThreadLauncher<K, C>) -> Result<Self> {
        plan.validate()?;
        launcher.threads().validate()?;
        Ok(Self { plan, launcher })
    }

    pub fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    pub fn launcher(&self) -> &ThreadLauncher<K, C> {
        &self.launcher
    }
}

/// Outcome of a complete experiment
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub plan: ExperimentPlan,
    pub table: LatencyTable,
    /// Wake signals absorbed into an already pending notification, summed
    /// over all runs. Non-zero means the consumer did not preempt every
    /// signal and some samples under-count wake-ups.
    pub coalesced_signals: u64,
    /// Runs whose last wake signal was still pending when the consumer
    /// was suspended
    pub left_pending: u64,
    /// False when the kernel only recorded priorities; the table then holds
    /// signalling costs, not preemption round trips
    pub priorities_enforced: bool,
}

/// Run every `(group, sample)` pair of the plan, group-major.
///
/// The first error aborts the whole experiment; no partial table is
/// returned.
#[inline(never)]
pub fn run_experiment<K: Kernel, C: CycleClock>(
    ctx: &mut BenchmarkContext<K, C>,
) -> Result<Measurement> {
    let plan = ctx.plan;
    let launcher = &mut ctx.launcher;
    let mut table = LatencyTable::new(plan.group_size, plan.group_count);
    let mut coalesced_signals = 0;
    let mut left_pending = 0;

    let priorities_enforced = launcher.kernel().enforces_priorities();
    if !priorities_enforced {
        warn!("Worker priorities are not enforced, samples are not wake-up round trips");
    }

    for run in plan.runs() {
        if run.sample_index == 0 {
            info!(
                group = run.group_index,
                loop_count = run.params.loop_count,
                "Starting group"
            );
        }

        let pair = launcher.start_run(run.params)?;
        launcher.done().wait();
        let stats = launcher.stop_run(pair)?;

        let sample = launcher.slot().take().ok_or(BenchError::MissingSample)?;
        table.record(run.sample_index, run.group_index, black_box(sample))?;

        if stats.coalesced > 0 {
            warn!(
                group = run.group_index,
                sample = run.sample_index,
                coalesced = stats.coalesced,
                "Wake signals coalesced, consumer did not preempt every signal"
            );
            coalesced_signals += stats.coalesced;
        }
        left_pending += stats.left_pending();
        debug!(
            group = run.group_index,
            sample = run.sample_index,
            cycles = sample,
            "Run complete"
        );
    }

    info!(runs = plan.total_runs(), "Measurement complete");
    Ok(Measurement {
        plan,
        table,
        coalesced_signals,
        left_pending,
        priorities_enforced,
    })
}

/// Run the configured experiment on host threads with the hardware clock
pub fn run_host_benchmark(config: &Config) -> Result<Measurement> {
    config.validate()?;

    let kernel = HostKernel::new(config.scheduler.policy, config.scheduler.cpu_core);
    let launcher = ThreadLauncher::new(kernel, HardwareClock::new(), config.threads.clone());
    let mut ctx = BenchmarkContext::new(config.plan, launcher)?;
    run_experiment(&mut ctx)
}
