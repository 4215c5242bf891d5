//! Periodic sampling of the metrics source
//!
//! The sampler owns the interval timer and hands each snapshot (or the
//! reason there is none) to a [`TickHandler`]. A failing source only skips
//! its tick; the schedule carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info};

use crate::error::{MonitorError, Result, SourceError, SourceResult};
use crate::model::Snapshot;
use crate::schedule::PeriodicTask;
use crate::source::MetricsSource;

/// Receives the outcome of every sampling tick
#[async_trait]
pub trait TickHandler: Send + Sync {
    async fn on_snapshot(&self, snapshot: Snapshot);

    async fn on_degraded(&self, error: SourceError);
}

/// Take one sample bounded by `timeout`. Out-of-range snapshots are
/// reported as an unavailable source.
pub async fn sample_with_timeout(source: &dyn MetricsSource, timeout: Duration) -> SourceResult<Snapshot> {
    let snapshot = time::timeout(timeout, source.sample())
        .await
        .map_err(|_| SourceError::Timeout { timeout })??;

    snapshot.validate()?;
    Ok(snapshot)
}

pub struct Sampler {
    interval: Duration,
    sample_timeout: Duration,
    source: Arc<dyn MetricsSource>,
    task: Mutex<Option<PeriodicTask>>,
}

impl Sampler {
    pub fn new(interval: Duration, sample_timeout: Duration, source: Arc<dyn MetricsSource>) -> Self {
        Self {
            interval,
            sample_timeout,
            source,
            task: Mutex::new(None),
        }
    }

    /// Begin sampling; the first tick fires immediately
    pub async fn start(&self, handler: Arc<dyn TickHandler>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(MonitorError::Scheduling("sampler is already running".to_string()));
        }

        let source = self.source.clone();
        let timeout = self.sample_timeout;

        *task = Some(PeriodicTask::spawn("sampler", self.interval, move || {
            let source = source.clone();
            let handler = handler.clone();
            async move {
                match sample_with_timeout(source.as_ref(), timeout).await {
                    Ok(snapshot) => handler.on_snapshot(snapshot).await,
                    Err(error) => handler.on_degraded(error).await,
                }
            }
        }));

        info!(
            source = self.source.name(),
            interval_ms = self.interval.as_millis() as u64,
            "Sampler started"
        );
        Ok(())
    }

    /// Stop sampling. Returns after the in-flight tick completes; a no-op
    /// when not running.
    pub async fn stop(&self) -> Result<()> {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => {
                task.stop().await?;
                info!("Sampler stopped");
            }
            None => debug!("Sampler stop requested while not running"),
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
