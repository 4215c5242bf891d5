//! Alert delivery capability
//!
//! Notification is best effort: the pipeline bounds every call with a
//! timeout and logs failures without propagating them.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::alert::AlertEvent;
use crate::error::NotifyResult;

/// Delivers alert events to operators or downstream systems
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> NotifyResult<()>;

    /// Name used in logs
    fn name(&self) -> &str {
        "notifier"
    }
}

/// Writes alert events to the tracing subscriber
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AlertEvent) -> NotifyResult<()> {
        match event {
            AlertEvent::Raised { metric, severity, value, threshold, source, .. } => {
                warn!(
                    %metric, %severity, value, threshold, source = ?source,
                    "ALERT raised: {} at {:.2}% exceeds {:.2}%", metric, value, threshold
                );
            }
            AlertEvent::Escalated { metric, from, to, value, threshold, .. } => {
                error!(
                    %metric, from = %from, to = %to, value, threshold,
                    "ALERT escalated: {} {} -> {} at {:.2}%", metric, from, to, value
                );
            }
            AlertEvent::Cleared { metric, active_since, at } => {
                let duration = *at - *active_since;
                info!(
                    %metric, active_secs = duration.num_seconds(),
                    "ALERT cleared: {} back within threshold", metric
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
