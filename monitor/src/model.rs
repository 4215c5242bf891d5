//! Core data model shared by the sampling pipeline
//!
//! Snapshots and forecasts are immutable values produced by the injected
//! capabilities; findings are produced by the analyzer and consumed by the
//! alert manager within the same tick.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// A thresholded percentage metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Disk,
    Memory,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cpu, Metric::Disk, Metric::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Disk => "disk",
            Metric::Memory => "memory",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Metric::Cpu),
            "disk" => Ok(Metric::Disk),
            "memory" => Ok(Metric::Memory),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

/// One sample of system health, produced once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    /// Requests per second
    pub request_rate: f64,
}

impl Snapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        cpu_percent: f64,
        memory_percent: f64,
        disk_percent: f64,
        request_rate: f64,
    ) -> Self {
        Self {
            timestamp,
            cpu_percent,
            memory_percent,
            disk_percent,
            request_rate,
        }
    }

    /// Observed value for a thresholded metric
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu_percent,
            Metric::Disk => self.disk_percent,
            Metric::Memory => self.memory_percent,
        }
    }

    /// Reject samples outside the documented ranges
    pub fn validate(&self) -> Result<(), SourceError> {
        for metric in Metric::ALL {
            let value = self.value(metric);
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(SourceError::unavailable(format!(
                    "{} out of range: {}",
                    metric, value
                )));
            }
        }

        if !self.request_rate.is_finite() || self.request_rate < 0.0 {
            return Err(SourceError::unavailable(format!(
                "request_rate out of range: {}",
                self.request_rate
            )));
        }

        Ok(())
    }
}

/// Predicted state over a horizon, produced by a predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon_seconds: u64,
    pub predicted_cpu_percent: f64,
    pub predicted_memory_percent: f64,
    pub confidence_percent: f64,
}

impl Forecast {
    /// Predicted value for a metric, if the forecast covers it
    pub fn predicted(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Cpu => Some(self.predicted_cpu_percent),
            Metric::Memory => Some(self.predicted_memory_percent),
            Metric::Disk => None,
        }
    }
}

/// Finding severity, ordered `Info < Warning < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Whether a finding was observed or predicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Observed,
    Predicted,
}

/// A single threshold breach for one metric in one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub metric: Metric,
    pub severity: Severity,
    /// Observed value, or the predicted value for predicted findings
    pub observed_value: f64,
    pub threshold: f64,
    pub source: SourceKind,
}
