//! Background predictor retraining
//!
//! Runs on its own schedule, independent of sampling. The snapshot window
//! is copied under a brief read lock and the predictor is called with no
//! lock held; a successful retrain swaps the active model, a failed one
//! leaves it in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::error::{MonitorError, PredictorError, PredictorResult, Result};
use crate::event::MonitorEvent;
use crate::metrics::MonitorMetrics;
use crate::predictor::PredictorHandle;
use crate::schedule::PeriodicTask;
use crate::window::SnapshotWindow;

/// Shared resources one retrain cycle works against
#[derive(Clone)]
pub struct RetrainContext {
    pub handle: Arc<PredictorHandle>,
    pub window: Arc<RwLock<SnapshotWindow>>,
    pub timeout: Duration,
    pub events: broadcast::Sender<MonitorEvent>,
    pub metrics: MonitorMetrics,
}

impl RetrainContext {
    /// Run one retrain cycle and return the new model version
    pub async fn retrain_once(&self) -> PredictorResult<u64> {
        let window = self.window.read().await.to_vec();
        let model = self.handle.current();

        debug!(
            predictor = model.predictor.name(),
            version = model.version,
            samples = window.len(),
            "Retraining predictor"
        );

        let outcome = match time::timeout(self.timeout, model.predictor.retrain(&window)).await {
            Ok(result) => result,
            Err(_) => Err(PredictorError::Timeout { timeout: self.timeout }),
        };

        match outcome {
            Ok(predictor) => {
                let version = self.handle.swap(predictor);
                self.metrics.record_retrain_success(version);
                info!(version, samples = window.len(), "Predictor retrained");
                let _ = self.events.send(MonitorEvent::ModelRetrained { version, at: Utc::now() });
                Ok(version)
            }
            Err(error) => {
                self.metrics.record_retrain_failure();
                warn!(
                    error = %error,
                    active_version = model.version,
                    "Retrain failed, keeping current model"
                );
                let _ = self.events.send(MonitorEvent::RetrainFailed {
                    reason: error.to_string(),
                    at: Utc::now(),
                });
                Err(error)
            }
        }
    }
}

#[derive(Default)]
pub struct RetrainScheduler {
    task: Mutex<Option<PeriodicTask>>,
}

impl RetrainScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrain every `interval`. The first cycle runs one interval after
    /// start so the window has had time to fill.
    pub async fn start(&self, interval: Duration, context: RetrainContext) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(MonitorError::Scheduling("retrain scheduler is already running".to_string()));
        }

        *task = Some(PeriodicTask::spawn_at(
            "retrain",
            Instant::now() + interval,
            interval,
            move || {
                let context = context.clone();
                async move {
                    // failures are reported through events and metrics
                    let _ = context.retrain_once().await;
                }
            },
        ));

        info!(interval_ms = interval.as_millis() as u64, "Retrain scheduler started");
        Ok(())
    }

    /// Stop retraining, waiting for an in-flight retrain to finish
    pub async fn stop(&self) -> Result<()> {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.stop().await?;
            info!("Retrain scheduler stopped");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}
