use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use devsim_monitor::error::{SourceError, SourceResult};
use devsim_monitor::{MetricsSource, Snapshot};

/// One scripted answer to `sample()`
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Sample(Snapshot),
    Fail(String),
    /// Sleep first, then answer with the snapshot
    Slow(Duration, Snapshot),
}

/// Metrics source replaying a script. The last step repeats once the
/// script is exhausted.
pub struct ScriptedSource {
    script: Mutex<VecDeque<ScriptStep>>,
    last: Mutex<Option<ScriptStep>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self::new(snapshots.into_iter().map(ScriptStep::Sample).collect())
    }

    /// Every sample is delayed by `delay`
    pub fn slow(snapshots: Vec<Snapshot>, delay: Duration) -> Self {
        Self::new(snapshots.into_iter().map(|s| ScriptStep::Slow(delay, s)).collect())
    }

    /// Number of `sample()` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = script.pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn sample(&self) -> SourceResult<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_step() {
            Some(ScriptStep::Sample(snapshot)) => Ok(snapshot),
            Some(ScriptStep::Fail(reason)) => Err(SourceError::unavailable(reason)),
            Some(ScriptStep::Slow(delay, snapshot)) => {
                sleep(delay).await;
                Ok(snapshot)
            }
            None => Err(SourceError::unavailable("empty script")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
