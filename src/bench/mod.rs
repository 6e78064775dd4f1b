//! Benchmark module
//! Wake-up latency under priority preemption

pub mod launcher;
pub mod measure;
pub mod report;
pub mod table;
pub mod workers;

pub use launcher::{RunStats, RunningPair, ThreadLauncher};
pub use measure::{run_experiment, run_host_benchmark, BenchmarkContext, Measurement};
pub use report::LatencyReport;
pub use table::LatencyTable;
pub use workers::SampleSlot;
