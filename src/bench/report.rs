//! Latency report
//!
//! Plan parameters followed by the raw table, one row per sample index and
//! one column per group, for external post-processing.

use std::fmt;

use super::measure::Measurement;
use crate::config::ReportFormat;
use crate::error::Result;

pub struct LatencyReport<'a> {
    measurement: &'a Measurement,
}

impl<'a> LatencyReport<'a> {
    pub fn new(measurement: &'a Measurement) -> Self {
        Self { measurement }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self.measurement)?)
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_string()),
            ReportFormat::Json => self.to_json(),
        }
    }
}

impl fmt::Display for LatencyReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = &self.measurement.plan;
        writeln!(f, "Initial Test size: {}", plan.initial_size)?;
        writeln!(f, "Delta: {}", plan.delta)?;
        writeln!(
            f,
            "Number of Tests / Sample size of Accumulated latency: {}",
            plan.group_size
        )?;
        writeln!(f, "Number of Groups: {}", plan.group_count)?;
        writeln!(f, "Accumulated latencies (clock cycles): ")?;

        for row in self.measurement.table.rows() {
            for cell in row {
                // Only complete tables are reported; a gap shows as `-`
                match cell {
                    Some(cycles) => write!(f, "{} ", cycles)?,
                    None => write!(f, "- ")?,
                }
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(f, "Done!")
    }
}
