//! notify-bench CLI
//! Reports accumulated wake-up latencies on stdout; logs go to stderr.

use anyhow::Context;
use notify_bench::config::{LoggingConfig, ReportFormat};
use notify_bench::{run_host_benchmark, Config, LatencyReport};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if logging.json_output {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Load configuration
    let mut config = Config::from_env().context("loading configuration")?;

    init_logging(&config.logging)?;

    // Check CLI args
    let args: Vec<String> = env::args().collect();
    if args.iter().skip(1).any(|arg| arg == "--json") {
        config.report.format = ReportFormat::Json;
    }

    let plan = config.plan;
    info!(
        initial_size = plan.initial_size,
        delta = plan.delta,
        group_size = plan.group_size,
        group_count = plan.group_count,
        policy = ?config.scheduler.policy,
        "Configuration loaded"
    );

    let measurement = match run_host_benchmark(&config) {
        Ok(measurement) => measurement,
        Err(e) => {
            error!("Benchmark aborted: {}", e);
            return Err(e.into());
        }
    };

    if !measurement.priorities_enforced {
        warn!("Scheduler policy `inherit` does not apply priorities; latencies are not comparable");
    }
    if measurement.coalesced_signals > 0 {
        warn!(
            coalesced = measurement.coalesced_signals,
            "Some wake signals were coalesced; samples may under-count wake-ups"
        );
    }

    let report = LatencyReport::new(&measurement).render(config.report.format)?;
    print!("{}", report);
    Ok(())
}
