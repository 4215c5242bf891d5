use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use devsim_monitor::error::{NotifyError, NotifyResult};
use devsim_monitor::{AlertEvent, Metric, Notifier};

/// Notifier that records every delivered event
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<AlertEvent>>>,
    delay: Duration,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each delivery takes `delay` before it is recorded
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record, then report a delivery failure
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(kind, metric)` of every recorded event, in delivery order
    pub fn kinds(&self) -> Vec<(&'static str, Metric)> {
        self.events().iter().map(|e| (e.kind(), e.metric())).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &AlertEvent) -> NotifyResult<()> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        self.events.lock().unwrap().push(event.clone());

        if self.fail {
            return Err(NotifyError::DeliveryFailed {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
