//! Notification wake-up latency benchmark
//!
//! A low-priority producer signals a notification that a high-priority
//! consumer waits on. With strict priority preemption every signal switches
//! to the consumer and back, so the cycles spent in the producer's signal
//! loop measure the wake-up round trip.
//!
//! ## Architecture
//! - Clock: hardware cycle counter
//! - Sync: binary notifications and per-thread suspend flags
//! - Kernel: thread lifecycle interface and the host implementation
//! - Bench: worker bodies, launcher, measurement loop, table and report

pub mod bench;
pub mod clock;
pub mod config;
pub mod error;
pub mod kernel;
pub mod sync;
pub mod types;

pub use bench::{
    run_experiment, run_host_benchmark, BenchmarkContext, LatencyReport, LatencyTable, Measurement,
};
pub use clock::{CycleClock, HardwareClock};
pub use config::Config;
pub use error::{BenchError, Result};
pub use kernel::{HostKernel, Kernel};
pub use sync::Notification;
pub use types::{ExperimentPlan, LatencySample, Priority, RunParameters};
