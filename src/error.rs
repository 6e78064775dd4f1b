//! Error taxonomy
//!
//! Every variant is fatal to the benchmark: a missing or misconfigured
//! worker thread invalidates all samples that would follow it.

use std::fmt;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = BenchError> = std::result::Result<T, E>;

/// Step of the thread lifecycle that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AllocateStack,
    AllocateThread,
    ConfigurePriority,
    WriteRegisters,
    PinCore,
    Start,
    Suspend,
    Release,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::AllocateStack => "allocate stack",
            Step::AllocateThread => "allocate thread object",
            Step::ConfigurePriority => "configure priority",
            Step::WriteRegisters => "write initial registers",
            Step::PinCore => "pin to core",
            Step::Start => "start thread",
            Step::Suspend => "suspend thread",
            Step::Release => "release thread",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("resource exhaustion during {step} of {thread}: {reason}")]
    ResourceExhaustion {
        step: Step,
        thread: String,
        reason: String,
    },

    #[error("configuration failure during {step} of {thread}: {reason}")]
    ConfigurationFailure {
        step: Step,
        thread: String,
        reason: String,
    },

    #[error("{thread}: cannot {step} while {found} (expected {expected})")]
    InvalidThreadState {
        thread: String,
        step: Step,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid experiment plan: {0}")]
    InvalidPlan(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("latency table cell [{sample_index}][{group_index}] {problem}")]
    Table {
        sample_index: usize,
        group_index: usize,
        problem: &'static str,
    },

    #[error("producer signalled completion without writing a sample")]
    MissingSample,

    #[error("config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl BenchError {
    pub fn exhausted(step: Step, thread: &str, reason: impl fmt::Display) -> Self {
        BenchError::ResourceExhaustion {
            step,
            thread: thread.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(step: Step, thread: &str, reason: impl fmt::Display) -> Self {
        BenchError::ConfigurationFailure {
            step,
            thread: thread.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Failing step, when the error comes from the thread lifecycle
    pub fn step(&self) -> Option<Step> {
        match self {
            BenchError::ResourceExhaustion { step, .. }
            | BenchError::ConfigurationFailure { step, .. }
            | BenchError::InvalidThreadState { step, .. } => Some(*step),
            _ => None,
        }
    }
}
