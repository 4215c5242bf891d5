//! Core monitoring service
//!
//! [`MonitorService`] wires a metrics source, an optional predictor and a
//! notifier into the sampling and retraining schedules, and exposes the
//! lifecycle controls and read-only alert state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time;
use tracing::{debug, info, warn};

use crate::alert::{AlertEvent, AlertManager, AlertState, HealthStatus};
use crate::analyzer::{evaluate, AnalysisPolicy};
use crate::config::MonitorConfig;
use crate::error::{ConfigError, MonitorError, NotifyError, PredictorError, Result, SourceError};
use crate::event::MonitorEvent;
use crate::metrics::{MetricsSummary, MonitorMetrics};
use crate::model::{Finding, Forecast, Snapshot};
use crate::notifier::Notifier;
use crate::predictor::{Predictor, PredictorHandle};
use crate::retrain::{RetrainContext, RetrainScheduler};
use crate::sampler::{sample_with_timeout, Sampler, TickHandler};
use crate::source::MetricsSource;
use crate::window::SnapshotWindow;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Health monitoring service
pub struct MonitorService {
    /// Configuration
    config: MonitorConfig,

    /// Source shared with the sampler, used directly by `check_once`
    source: Arc<dyn MetricsSource>,

    /// Sampling tick pipeline
    pipeline: Arc<TickPipeline>,

    /// Periodic sampling
    sampler: Sampler,

    /// Periodic retraining, idle when prediction is disabled
    retrain: RetrainScheduler,

    /// Service state
    state: Arc<RwLock<ServiceState>>,
}

/// Service state
#[derive(Debug, Clone, Serialize)]
pub struct ServiceState {
    /// Service status
    pub status: ServiceStatus,

    /// When the service last started
    pub started_at: Option<DateTime<Utc>>,

    /// Timestamp of the last analyzed snapshot
    pub last_tick: Option<DateTime<Utc>>,

    /// Last recoverable error
    pub last_error: Option<String>,

    /// Tick statistics
    pub stats: TickStats,
}

/// Service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Tick statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickStats {
    /// Ticks that produced a snapshot
    pub total_ticks: u64,

    /// Ticks skipped because the source failed
    pub degraded_ticks: u64,

    /// Ticks analyzed without a forecast
    pub forecast_failures: u64,

    pub alerts_raised: u64,
    pub alerts_escalated: u64,
    pub alerts_cleared: u64,

    /// Average tick pipeline duration
    pub avg_tick_duration: Duration,
}

/// Outcome of one analyzed tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub snapshot: Snapshot,
    pub forecast: Option<Forecast>,
    pub findings: Vec<Finding>,
    pub events: Vec<AlertEvent>,
}

/// Everything one sampling tick touches after the snapshot is taken
struct TickPipeline {
    policy: AnalysisPolicy,
    /// Held for the whole tick, which serializes sampler ticks and `check_once`
    alerts: Mutex<AlertManager>,
    published: RwLock<Vec<AlertState>>,
    window: Arc<RwLock<SnapshotWindow>>,
    predictor: Option<Arc<PredictorHandle>>,
    forecast_timeout: Duration,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
    events: broadcast::Sender<MonitorEvent>,
    metrics: MonitorMetrics,
    state: Arc<RwLock<ServiceState>>,
}

impl TickPipeline {
    async fn run_tick(&self, snapshot: Snapshot) -> TickReport {
        let mut alerts = self.alerts.lock().await;
        let started = Instant::now();

        let forecast = match &self.predictor {
            Some(handle) => {
                let window = {
                    let mut window = self.window.write().await;
                    window.push(snapshot.clone());
                    window.to_vec()
                };
                self.forecast(handle, &window).await
            }
            None => None,
        };

        let findings = evaluate(&snapshot, forecast.as_ref(), &self.policy);
        let events = alerts.process(&findings, snapshot.timestamp);

        let states = alerts.states();
        self.metrics.set_active_alerts(states.len());
        *self.published.write().await = states;

        for event in &events {
            self.metrics.record_alert_event(event);
            self.deliver(event).await;
            let _ = self.events.send(MonitorEvent::Alert(event.clone()));
        }

        let elapsed = started.elapsed();
        self.metrics.record_tick(elapsed);

        {
            let mut state = self.state.write().await;
            let stats = &mut state.stats;
            stats.total_ticks += 1;
            for event in &events {
                match event {
                    AlertEvent::Raised { .. } => stats.alerts_raised += 1,
                    AlertEvent::Escalated { .. } => stats.alerts_escalated += 1,
                    AlertEvent::Cleared { .. } => stats.alerts_cleared += 1,
                }
            }

            let total = stats.avg_tick_duration.as_secs_f64() * (stats.total_ticks - 1) as f64 + elapsed.as_secs_f64();
            stats.avg_tick_duration = Duration::from_secs_f64(total / stats.total_ticks as f64);
            state.last_tick = Some(snapshot.timestamp);
        }

        debug!(
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            disk = snapshot.disk_percent,
            findings = findings.len(),
            events = events.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Tick complete"
        );

        TickReport {
            snapshot,
            forecast,
            findings,
            events,
        }
    }

    async fn forecast(&self, handle: &PredictorHandle, window: &[Snapshot]) -> Option<Forecast> {
        let model = handle.current();

        let result = match time::timeout(self.forecast_timeout, model.predictor.forecast(window)).await {
            Ok(Ok(forecast)) if !(0.0..=100.0).contains(&forecast.confidence_percent) => Err(
                PredictorError::unavailable(format!("confidence out of range: {}", forecast.confidence_percent)),
            ),
            Ok(result) => result,
            Err(_) => Err(PredictorError::Timeout {
                timeout: self.forecast_timeout,
            }),
        };

        match result {
            Ok(forecast) => Some(forecast),
            Err(error) => {
                self.metrics.record_forecast_failure();
                warn!(error = %error, version = model.version, "Forecast unavailable, analyzing observed values only");

                {
                    let mut state = self.state.write().await;
                    state.stats.forecast_failures += 1;
                    state.last_error = Some(error.to_string());
                }

                let _ = self.events.send(MonitorEvent::ForecastUnavailable {
                    reason: error.to_string(),
                    at: Utc::now(),
                });
                None
            }
        }
    }

    /// Best-effort delivery; failures are logged and counted only
    async fn deliver(&self, event: &AlertEvent) {
        let result = time::timeout(self.notify_timeout, self.notifier.notify(event))
            .await
            .unwrap_or_else(|_| {
                Err(NotifyError::Timeout {
                    timeout: self.notify_timeout,
                })
            });

        if let Err(error) = result {
            self.metrics.record_notify_failure();
            warn!(
                notifier = self.notifier.name(),
                metric = %event.metric(),
                kind = event.kind(),
                error = %error,
                "Alert delivery failed"
            );
        }
    }

    async fn degraded(&self, error: SourceError) {
        self.metrics.record_degraded_sample();
        warn!(error = %error, "Sample degraded, skipping tick");

        {
            let mut state = self.state.write().await;
            state.stats.degraded_ticks += 1;
            state.last_error = Some(error.to_string());
        }

        let _ = self.events.send(MonitorEvent::SampleDegraded {
            reason: error.to_string(),
            at: Utc::now(),
        });
    }
}

#[async_trait]
impl TickHandler for TickPipeline {
    async fn on_snapshot(&self, snapshot: Snapshot) {
        self.run_tick(snapshot).await;
    }

    async fn on_degraded(&self, error: SourceError) {
        self.degraded(error).await;
    }
}

impl MonitorService {
    /// Create a new monitoring service. Fails with an invalid-configuration
    /// error before anything is started.
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn MetricsSource>,
        notifier: Arc<dyn Notifier>,
        predictor: Option<Arc<dyn Predictor>>,
    ) -> Result<Self> {
        info!(environment = %config.environment, "Initializing monitor service");

        config.validate()?;
        let policy = AnalysisPolicy::from_config(&config.alerting, &config.prediction)?;

        let predictor = match (config.prediction.enabled, predictor) {
            (true, Some(predictor)) => Some(Arc::new(PredictorHandle::new(predictor))),
            (true, None) => {
                return Err(ConfigError::MissingField {
                    field: "predictor (prediction.enabled = true)".to_string(),
                }
                .into());
            }
            (false, Some(predictor)) => {
                debug!(predictor = predictor.name(), "Prediction disabled, ignoring predictor");
                None
            }
            (false, None) => None,
        };

        // Only forecasting and retraining read the window
        let window_capacity = if predictor.is_some() { config.window_capacity() } else { 1 };

        let metrics = MonitorMetrics::new()?;
        if let Some(handle) = &predictor {
            metrics.model_version.set(handle.version() as i64);
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = Arc::new(RwLock::new(ServiceState {
            status: ServiceStatus::Starting,
            started_at: None,
            last_tick: None,
            last_error: None,
            stats: TickStats::default(),
        }));

        let pipeline = Arc::new(TickPipeline {
            policy,
            alerts: Mutex::new(AlertManager::new(
                config.alerting.hysteresis_ticks,
                Duration::from_secs(config.alerting.suppression_window_secs),
            )),
            published: RwLock::new(Vec::new()),
            window: Arc::new(RwLock::new(SnapshotWindow::new(window_capacity))),
            predictor,
            forecast_timeout: config.forecast_timeout(),
            notifier,
            notify_timeout: config.notify_timeout(),
            events,
            metrics,
            state: state.clone(),
        });

        let sampler = Sampler::new(config.interval(), config.sample_timeout(), source.clone());

        info!(
            interval_ms = config.sampling.interval_ms,
            prediction = config.prediction.enabled,
            hysteresis_ticks = config.alerting.hysteresis_ticks,
            "Monitor service initialized"
        );

        Ok(Self {
            config,
            source,
            pipeline,
            sampler,
            retrain: RetrainScheduler::new(),
            state,
        })
    }

    /// Start sampling and, when prediction is enabled, retraining
    pub async fn start(&self) -> Result<()> {
        info!("Starting monitor service");

        self.sampler.start(self.pipeline.clone()).await?;

        if let Some(handle) = &self.pipeline.predictor {
            let context = RetrainContext {
                handle: handle.clone(),
                window: self.pipeline.window.clone(),
                timeout: self.config.retrain_timeout(),
                events: self.pipeline.events.clone(),
                metrics: self.pipeline.metrics.clone(),
            };

            if let Err(e) = self.retrain.start(self.config.retrain_interval(), context).await {
                self.sampler.stop().await?;
                return Err(e);
            }
        }

        {
            let mut state = self.state.write().await;
            state.status = ServiceStatus::Running;
            state.started_at = Some(Utc::now());
        }

        info!("Monitor service started");
        Ok(())
    }

    /// Stop retraining, then sampling. Each waits for its in-flight tick.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping monitor service");

        {
            let mut state = self.state.write().await;
            state.status = ServiceStatus::Stopping;
        }

        let retrain = self.retrain.stop().await;
        let sampler = self.sampler.stop().await;

        {
            let mut state = self.state.write().await;
            state.status = ServiceStatus::Stopped;
        }

        retrain?;
        sampler?;

        info!("Monitor service stopped");
        Ok(())
    }

    /// Active alerts ordered by metric name, as of the last completed tick
    pub async fn current_alert_states(&self) -> Vec<AlertState> {
        self.pipeline.published.read().await.clone()
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus::from_states(&self.pipeline.published.read().await)
    }

    /// Get service status
    pub async fn status(&self) -> ServiceState {
        self.state.read().await.clone()
    }

    /// Receive every event from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.pipeline.events.subscribe()
    }

    /// Run one tick inline, serialized with the sampler
    pub async fn check_once(&self) -> Result<TickReport> {
        match sample_with_timeout(self.source.as_ref(), self.config.sample_timeout()).await {
            Ok(snapshot) => Ok(self.pipeline.run_tick(snapshot).await),
            Err(error) => {
                self.pipeline.degraded(error.clone()).await;
                Err(MonitorError::Source(error))
            }
        }
    }

    /// Run one retrain cycle now, independent of the schedule
    pub async fn retrain_now(&self) -> Result<u64> {
        let handle = self
            .pipeline
            .predictor
            .as_ref()
            .ok_or_else(|| PredictorError::unavailable("prediction is disabled"))?;

        let context = RetrainContext {
            handle: handle.clone(),
            window: self.pipeline.window.clone(),
            timeout: self.config.retrain_timeout(),
            events: self.pipeline.events.clone(),
            metrics: self.pipeline.metrics.clone(),
        };
        Ok(context.retrain_once().await?)
    }

    /// Version of the active predictor, if prediction is enabled
    pub fn model_version(&self) -> Option<u64> {
        self.pipeline.predictor.as_ref().map(|h| h.version())
    }

    /// Prometheus text exposition
    pub fn metrics(&self) -> Result<String> {
        self.pipeline.metrics.export()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.pipeline.metrics.summary()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Wait for a shutdown signal
    #[cfg(unix)]
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        Ok(())
    }

    /// Wait for a shutdown signal
    #[cfg(not(unix))]
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }
}
