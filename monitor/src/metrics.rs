//! Prometheus metrics for the monitoring service
//!
//! Every tick, alert transition and retrain cycle is counted here. The
//! registry is private to the service and exported as text on demand.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};

use crate::alert::AlertEvent;
use crate::error::{MonitorError, Result};

/// Counters and gauges updated by the sampling and retraining tasks
#[derive(Clone)]
pub struct MonitorMetrics {
    registry: Registry,

    // Sampling
    pub ticks: IntCounter,
    pub degraded_samples: IntCounter,
    pub forecast_failures: IntCounter,
    pub tick_duration: Histogram,

    // Alerting
    pub alert_events: IntCounterVec,
    pub active_alerts: IntGauge,
    pub notify_failures: IntCounter,

    // Retraining
    pub retrains: IntCounterVec,
    pub model_version: IntGauge,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub ticks: u64,
    pub degraded_samples: u64,
    pub forecast_failures: u64,
    pub active_alerts: i64,
    pub model_version: i64,
    pub avg_tick_ms: f64,
}

impl MonitorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("devsim_monitor".to_string()), None)?;

        let ticks = IntCounter::new("ticks_total", "Sampling ticks that produced a snapshot")?;
        registry.register(Box::new(ticks.clone()))?;

        let degraded_samples = IntCounter::new(
            "degraded_samples_total",
            "Sampling ticks skipped because the source failed or timed out",
        )?;
        registry.register(Box::new(degraded_samples.clone()))?;

        let forecast_failures = IntCounter::new(
            "forecast_failures_total",
            "Ticks analyzed without a forecast because the predictor failed",
        )?;
        registry.register(Box::new(forecast_failures.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("tick_duration_seconds", "Full tick pipeline duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let alert_events = IntCounterVec::new(
            Opts::new("alert_events_total", "Alert transitions by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(alert_events.clone()))?;

        let active_alerts = IntGauge::new("active_alerts", "Metrics currently alerting")?;
        registry.register(Box::new(active_alerts.clone()))?;

        let notify_failures = IntCounter::new(
            "notify_failures_total",
            "Alert deliveries that failed or timed out",
        )?;
        registry.register(Box::new(notify_failures.clone()))?;

        let retrains = IntCounterVec::new(
            Opts::new("retrains_total", "Retrain cycles by outcome"),
            &["result"],
        )?;
        registry.register(Box::new(retrains.clone()))?;

        let model_version = IntGauge::new("model_version", "Version of the active predictor")?;
        registry.register(Box::new(model_version.clone()))?;

        Ok(Self {
            registry,
            ticks,
            degraded_samples,
            forecast_failures,
            tick_duration,
            alert_events,
            active_alerts,
            notify_failures,
            retrains,
            model_version,
        })
    }

    pub fn record_tick(&self, duration: Duration) {
        self.ticks.inc();
        self.tick_duration.observe(duration.as_secs_f64());
    }

    pub fn record_degraded_sample(&self) {
        self.degraded_samples.inc();
    }

    pub fn record_forecast_failure(&self) {
        self.forecast_failures.inc();
    }

    pub fn record_alert_event(&self, event: &AlertEvent) {
        self.alert_events.with_label_values(&[event.kind()]).inc();
    }

    pub fn record_notify_failure(&self) {
        self.notify_failures.inc();
    }

    pub fn set_active_alerts(&self, count: usize) {
        self.active_alerts.set(count as i64);
    }

    pub fn record_retrain_success(&self, version: u64) {
        self.retrains.with_label_values(&["success"]).inc();
        self.model_version.set(version as i64);
    }

    pub fn record_retrain_failure(&self) {
        self.retrains.with_label_values(&["failure"]).inc();
    }

    pub fn summary(&self) -> MetricsSummary {
        let count = self.tick_duration.get_sample_count();
        let avg_tick_ms = if count > 0 {
            self.tick_duration.get_sample_sum() / count as f64 * 1000.0
        } else {
            0.0
        };

        MetricsSummary {
            ticks: self.ticks.get(),
            degraded_samples: self.degraded_samples.get(),
            forecast_failures: self.forecast_failures.get(),
            active_alerts: self.active_alerts.get(),
            model_version: self.model_version.get(),
            avg_tick_ms,
        }
    }

    /// Prometheus text exposition of every registered metric
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MonitorError::Generic(format!("metrics output is not UTF-8: {}", e)))
    }
}
