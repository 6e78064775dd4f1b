//! Configuration module

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::kernel::{SchedPolicy, ThreadRequest};
use crate::types::{ExperimentPlan, Priority};

/// Page size used to express stack sizes
pub const PAGE_SIZE: usize = 4096;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Experiment shape
    pub plan: ExperimentPlan,

    /// Worker thread resources
    pub threads: ThreadConfig,

    /// Scheduling of the workers
    pub scheduler: SchedulerConfig,

    /// Report output
    pub report: ReportConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Signals the consumer and takes the timestamps
    pub producer: WorkerConfig,
    /// Waits on the wake notification; must outrank the producer
    pub consumer: WorkerConfig,
    pub stack_pages: usize,
    pub tls_size: usize,
    /// Scheduling budget and period, for kernels that need one
    pub budget_us: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: SchedPolicy,
    /// Core both workers are pinned to
    pub cpu_core: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_output: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            producer: WorkerConfig {
                name: "Low prio".to_string(),
                priority: Priority(254),
            },
            consumer: WorkerConfig {
                name: "High prio".to_string(),
                priority: Priority(255),
            },
            stack_pages: 4,
            tls_size: PAGE_SIZE,
            budget_us: 100 * 1_000_000,
        }
    }
}

impl ThreadConfig {
    pub fn stack_size(&self) -> usize {
        self.stack_pages * PAGE_SIZE
    }

    /// The consumer must outrank the producer and both need a stack
    pub fn validate(&self) -> Result<()> {
        if self.producer.priority >= self.consumer.priority {
            return Err(BenchError::InvalidConfig(format!(
                "producer priority {} must be below consumer priority {}",
                self.producer.priority.0, self.consumer.priority.0
            )));
        }
        if self.stack_pages == 0 {
            return Err(BenchError::InvalidConfig("stack_pages must be >= 1".into()));
        }
        Ok(())
    }

    pub fn request(&self, worker: &WorkerConfig) -> ThreadRequest {
        ThreadRequest {
            name: worker.name.clone(),
            priority: worker.priority,
            stack_size: self.stack_size(),
            tls_size: self.tls_size,
            budget: Duration::from_micros(self.budget_us),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedPolicy::Fifo,
            cpu_core: Some(0),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_output: false,
        }
    }
}

impl Config {
    /// Load config from environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        // Try to load from file first
        let config_path = std::env::var("NOTIFY_BENCH_CONFIG")
            .unwrap_or_else(|_| "config/notify-bench.json".to_string());

        if Path::new(&config_path).exists() {
            Self::load(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.plan.validate()?;
        self.threads.validate()?;

        if let Some(core) = self.scheduler.cpu_core {
            let cpus = num_cpus::get();
            if core >= cpus {
                return Err(BenchError::InvalidConfig(format!(
                    "cpu_core {core} out of range, {cpus} cpus available"
                )));
            }
        }
        Ok(())
    }
}
