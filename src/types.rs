//! Core types for the benchmark

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Cycle-delta measured around one run's timed section
pub type LatencySample = u64;

/// Scheduling priority on a 0-255 scale, higher is more urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Map onto a platform range `[min, max]`, anchored at the top.
    ///
    /// `255` maps to `max`, `254` to `max - 1` and so on; everything that
    /// falls below `min` saturates there. Adjacent top priorities stay
    /// distinct even when the platform range is narrower than 256.
    pub fn to_platform(self, min: i32, max: i32) -> i32 {
        let below_top = i32::from(u8::MAX - self.0);
        (max - below_top).max(min)
    }
}

/// Shape of one experiment: groups of runs with growing loop counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    /// Loop count of group 0
    pub initial_size: u64,
    /// Loop count increment between consecutive groups
    pub delta: u64,
    /// Runs per group
    pub group_size: usize,
    /// Number of groups
    pub group_count: usize,
}

impl Default for ExperimentPlan {
    fn default() -> Self {
        Self {
            initial_size: 1,
            delta: 1,
            group_size: 30,
            group_count: 5,
        }
    }
}

impl ExperimentPlan {
    pub fn new(
        initial_size: u64,
        delta: u64,
        group_size: usize,
        group_count: usize,
    ) -> Result<Self> {
        let plan = Self {
            initial_size,
            delta,
            group_size,
            group_count,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_size < 1 {
            return Err(BenchError::InvalidPlan("initial_size must be >= 1".into()));
        }
        if self.group_size < 1 {
            return Err(BenchError::InvalidPlan("group_size must be >= 1".into()));
        }
        if self.group_count < 1 {
            return Err(BenchError::InvalidPlan("group_count must be >= 1".into()));
        }
        (self.group_count as u64 - 1)
            .checked_mul(self.delta)
            .and_then(|span| span.checked_add(self.initial_size))
            .ok_or_else(|| {
                BenchError::InvalidPlan("loop count of the last group overflows".into())
            })?;
        Ok(())
    }

    /// Loop count used by every run of `group_index`
    pub fn loop_count(&self, group_index: usize) -> u64 {
        self.initial_size + group_index as u64 * self.delta
    }

    pub fn total_runs(&self) -> usize {
        self.group_size * self.group_count
    }

    /// All runs in execution order: every sample of group 0, then group 1, ...
    pub fn runs(&self) -> impl Iterator<Item = PlannedRun> + '_ {
        (0..self.group_count).flat_map(move |group_index| {
            let params = RunParameters {
                loop_count: self.loop_count(group_index),
            };
            (0..self.group_size).map(move |sample_index| PlannedRun {
                group_index,
                sample_index,
                params,
            })
        })
    }
}

/// Parameters handed to a freshly constructed producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParameters {
    pub loop_count: u64,
}

/// One cell of the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedRun {
    pub group_index: usize,
    pub sample_index: usize,
    pub params: RunParameters,
}
