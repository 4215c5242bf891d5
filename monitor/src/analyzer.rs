//! Threshold and predictive analysis of a single snapshot
//!
//! [`evaluate`] is a pure function: identical inputs always yield the same
//! findings in the same order, and nothing outside its arguments is read or
//! written.

use std::collections::BTreeMap;

use crate::config::AlertingConfig;
use crate::config::PredictionConfig;
use crate::error::ConfigResult;
use crate::model::{Finding, Forecast, Metric, Severity, Snapshot, SourceKind};

/// Validated analysis parameters, built once from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPolicy {
    pub thresholds: BTreeMap<Metric, f64>,
    pub critical_multiplier: f64,
    pub min_forecast_confidence: f64,
}

impl AnalysisPolicy {
    pub fn new(thresholds: BTreeMap<Metric, f64>) -> Self {
        Self {
            thresholds,
            critical_multiplier: 1.2,
            min_forecast_confidence: 0.0,
        }
    }

    pub fn from_config(alerting: &AlertingConfig, prediction: &PredictionConfig) -> ConfigResult<Self> {
        Ok(Self {
            thresholds: alerting.metric_thresholds()?,
            critical_multiplier: alerting.critical_multiplier,
            min_forecast_confidence: prediction.min_confidence,
        })
    }

    pub fn with_critical_multiplier(mut self, multiplier: f64) -> Self {
        self.critical_multiplier = multiplier;
        self
    }

    pub fn with_min_forecast_confidence(mut self, confidence: f64) -> Self {
        self.min_forecast_confidence = confidence;
        self
    }

    fn observed_severity(&self, value: f64, threshold: f64) -> Option<Severity> {
        if value > threshold * self.critical_multiplier {
            Some(Severity::Critical)
        } else if value > threshold {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// Evaluate a snapshot and optional forecast against the policy.
///
/// At most one finding is produced per metric. Observed breaches take
/// precedence; a predicted breach is only reported when the observed value
/// is within its threshold, and is never more severe than a warning.
/// Findings are ordered by severity (most severe first), then metric name.
pub fn evaluate(snapshot: &Snapshot, forecast: Option<&Forecast>, policy: &AnalysisPolicy) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (&metric, &threshold) in &policy.thresholds {
        let observed = snapshot.value(metric);

        if let Some(severity) = policy.observed_severity(observed, threshold) {
            findings.push(Finding {
                metric,
                severity,
                observed_value: observed,
                threshold,
                source: SourceKind::Observed,
            });
            continue;
        }

        let Some(forecast) = forecast else { continue };
        let Some(predicted) = forecast.predicted(metric) else { continue };

        if predicted > threshold {
            let severity = if forecast.confidence_percent < policy.min_forecast_confidence {
                Severity::Info
            } else {
                Severity::Warning
            };

            findings.push(Finding {
                metric,
                severity,
                observed_value: predicted,
                threshold,
                source: SourceKind::Predicted,
            });
        }
    }

    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.metric.as_str().cmp(b.metric.as_str()))
    });

    findings
}
