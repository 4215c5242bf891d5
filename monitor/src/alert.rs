//! Alert state tracking, escalation and hysteresis
//!
//! The [`AlertManager`] owns one [`AlertState`] per metric and turns each
//! tick's findings into [`AlertEvent`]s. It performs no I/O and cannot fail;
//! delivering events is left to a notifier.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Finding, Metric, Severity, SourceKind};

/// Tracked state of one active alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub metric: Metric,
    pub active_since: DateTime<Utc>,
    pub last_severity: Severity,
    /// Duplicate findings are suppressed at least until this instant
    pub suppress_until: DateTime<Utc>,
    pub last_value: f64,
    pub source: SourceKind,
    /// Consecutive ticks without a finding for this metric
    pub quiet_ticks: u32,
}

/// Transition emitted by the alert manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Raised {
        metric: Metric,
        severity: Severity,
        value: f64,
        threshold: f64,
        source: SourceKind,
        at: DateTime<Utc>,
    },
    Escalated {
        metric: Metric,
        from: Severity,
        to: Severity,
        value: f64,
        threshold: f64,
        source: SourceKind,
        at: DateTime<Utc>,
    },
    Cleared {
        metric: Metric,
        active_since: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

impl AlertEvent {
    pub fn metric(&self) -> Metric {
        match self {
            AlertEvent::Raised { metric, .. }
            | AlertEvent::Escalated { metric, .. }
            | AlertEvent::Cleared { metric, .. } => *metric,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::Raised { .. } => "raised",
            AlertEvent::Escalated { .. } => "escalated",
            AlertEvent::Cleared { .. } => "cleared",
        }
    }

    /// Severity after the transition; `None` once cleared
    pub fn severity(&self) -> Option<Severity> {
        match self {
            AlertEvent::Raised { severity, .. } => Some(*severity),
            AlertEvent::Escalated { to, .. } => Some(*to),
            AlertEvent::Cleared { .. } => None,
        }
    }
}

/// Overall health derived from the active alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn from_states(states: &[AlertState]) -> Self {
        match states.iter().map(|s| s.last_severity).max() {
            None => HealthStatus::Healthy,
            Some(Severity::Critical) => HealthStatus::Critical,
            Some(_) => HealthStatus::Degraded,
        }
    }
}

/// Longest accepted suppression window, one year
pub const MAX_SUPPRESSION_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Per-metric alert state machine: Clear -> Active(severity) -> Clear
#[derive(Debug, Clone)]
pub struct AlertManager {
    hysteresis_ticks: u32,
    suppression_window: Duration,
    states: BTreeMap<Metric, AlertState>,
}

impl AlertManager {
    /// `hysteresis_ticks` below one is treated as one. The suppression
    /// window is capped at [`MAX_SUPPRESSION_WINDOW_SECS`].
    pub fn new(hysteresis_ticks: u32, suppression_window: std::time::Duration) -> Self {
        let secs = suppression_window.as_secs().min(MAX_SUPPRESSION_WINDOW_SECS) as i64;
        Self {
            hysteresis_ticks: hysteresis_ticks.max(1),
            suppression_window: Duration::try_seconds(secs).unwrap_or_else(Duration::zero),
            states: BTreeMap::new(),
        }
    }

    fn suppress_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.suppression_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Process one tick's findings.
    ///
    /// Events for the findings come first, in the order the findings were
    /// given; `Cleared` events follow in metric name order. When a metric
    /// appears more than once only its most severe finding counts.
    pub fn process(&mut self, findings: &[Finding], now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let mut seen = BTreeSet::new();
        let suppress_until = self.suppress_until(now);

        for finding in strongest_per_metric(findings) {
            seen.insert(finding.metric);

            match self.states.get_mut(&finding.metric) {
                None => {
                    self.states.insert(
                        finding.metric,
                        AlertState {
                            metric: finding.metric,
                            active_since: now,
                            last_severity: finding.severity,
                            suppress_until,
                            last_value: finding.observed_value,
                            source: finding.source,
                            quiet_ticks: 0,
                        },
                    );

                    events.push(AlertEvent::Raised {
                        metric: finding.metric,
                        severity: finding.severity,
                        value: finding.observed_value,
                        threshold: finding.threshold,
                        source: finding.source,
                        at: now,
                    });
                }
                Some(state) => {
                    state.quiet_ticks = 0;
                    state.last_value = finding.observed_value;

                    if finding.severity > state.last_severity {
                        let from = state.last_severity;
                        state.last_severity = finding.severity;
                        state.source = finding.source;
                        state.suppress_until = suppress_until;

                        events.push(AlertEvent::Escalated {
                            metric: finding.metric,
                            from,
                            to: finding.severity,
                            value: finding.observed_value,
                            threshold: finding.threshold,
                            source: finding.source,
                            at: now,
                        });
                    }
                }
            }
        }

        let mut cleared = Vec::new();
        for (metric, state) in self.states.iter_mut() {
            if seen.contains(metric) {
                continue;
            }
            state.quiet_ticks += 1;
            if state.quiet_ticks >= self.hysteresis_ticks {
                cleared.push(*metric);
            }
        }

        for metric in cleared {
            if let Some(state) = self.states.remove(&metric) {
                events.push(AlertEvent::Cleared {
                    metric,
                    active_since: state.active_since,
                    at: now,
                });
            }
        }

        events
    }

    /// Active alert states ordered by metric name
    pub fn states(&self) -> Vec<AlertState> {
        self.states.values().cloned().collect()
    }

    pub fn state(&self, metric: Metric) -> Option<&AlertState> {
        self.states.get(&metric)
    }

    pub fn active_count(&self) -> usize {
        self.states.len()
    }

    pub fn hysteresis_ticks(&self) -> u32 {
        self.hysteresis_ticks
    }
}

/// Keep the most severe finding per metric, first occurrence wins ties
fn strongest_per_metric(findings: &[Finding]) -> Vec<&Finding> {
    let mut selected: Vec<&Finding> = Vec::with_capacity(findings.len());

    for finding in findings {
        match selected.iter_mut().find(|f| f.metric == finding.metric) {
            Some(existing) => {
                if finding.severity > existing.severity {
                    *existing = finding;
                }
            }
            None => selected.push(finding),
        }
    }

    selected
}
