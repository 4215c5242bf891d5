//! Cancellable periodic task with drain-on-stop
//!
//! Each run of the job completes before the next tick is awaited, so runs
//! never overlap. Shutdown is only observed between runs: [`PeriodicTask::stop`]
//! returns once the run in flight (if any) has finished.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::{MonitorError, Result};

/// Handle to a running periodic job
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Run `job` every `period`, starting immediately
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_at(name, Instant::now(), period, job)
    }

    /// Run `job` every `period`, first at `start`
    pub fn spawn_at<F, Fut>(name: impl Into<String>, start: Instant, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        // tokio panics on a zero period
        let period = period.max(Duration::from_millis(1));

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }

                job().await;
            }

            debug!(task = %task_name, "Periodic task exited");
        });

        debug!(task = %name, period_ms = period.as_millis() as u64, "Periodic task spawned");
        Self { name, shutdown, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has exited on its own (panicked job)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation and wait for the in-flight run to finish
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| MonitorError::Scheduling(format!("{} task failed: {}", self.name, e)))
    }
}
