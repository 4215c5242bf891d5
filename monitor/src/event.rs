//! Events broadcast by the monitoring service

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::AlertEvent;

/// Everything observable that happens on the sampling and retrain schedules.
///
/// Recoverable failures are reported here instead of being returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// The tick was skipped because the source failed or timed out
    SampleDegraded { reason: String, at: DateTime<Utc> },

    /// The tick was analyzed from observed values only
    ForecastUnavailable { reason: String, at: DateTime<Utc> },

    Alert(AlertEvent),

    ModelRetrained { version: u64, at: DateTime<Utc> },

    /// The previous model stays active
    RetrainFailed { reason: String, at: DateTime<Utc> },
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::SampleDegraded { .. } => "sample_degraded",
            MonitorEvent::ForecastUnavailable { .. } => "forecast_unavailable",
            MonitorEvent::Alert(_) => "alert",
            MonitorEvent::ModelRetrained { .. } => "model_retrained",
            MonitorEvent::RetrainFailed { .. } => "retrain_failed",
        }
    }

    pub fn as_alert(&self) -> Option<&AlertEvent> {
        match self {
            MonitorEvent::Alert(event) => Some(event),
            _ => None,
        }
    }
}
