//! Predictor capability and the swappable active-model handle
//!
//! A predictor is immutable once built. Retraining produces a new
//! predictor, and [`PredictorHandle`] swaps the current-version pointer so
//! sampling ticks always read a complete model without waiting on a
//! retrain in progress.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{PredictorError, PredictorResult};
use crate::model::{Forecast, Snapshot};

/// Forecasts future metrics from a window of recent snapshots
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Forecast from the window, oldest snapshot first
    async fn forecast(&self, window: &[Snapshot]) -> PredictorResult<Forecast>;

    /// Build a refreshed model from the window. `self` stays usable when this fails.
    async fn retrain(&self, window: &[Snapshot]) -> PredictorResult<Arc<dyn Predictor>>;

    /// Name used in logs
    fn name(&self) -> &str {
        "predictor"
    }
}

/// The model sampling ticks currently forecast with
#[derive(Clone)]
pub struct ActiveModel {
    pub version: u64,
    pub predictor: Arc<dyn Predictor>,
}

impl fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveModel")
            .field("version", &self.version)
            .field("predictor", &self.predictor.name())
            .finish()
    }
}

/// Single-writer, many-reader pointer to the active model
pub struct PredictorHandle {
    current: watch::Sender<ActiveModel>,
}

impl PredictorHandle {
    /// The initial model is version 1
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        let (current, _) = watch::channel(ActiveModel { version: 1, predictor });
        Self { current }
    }

    /// Clone of the current model; never waits on a retrain
    pub fn current(&self) -> ActiveModel {
        self.current.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.borrow().version
    }

    /// Replace the active model and return its new version
    pub fn swap(&self, predictor: Arc<dyn Predictor>) -> u64 {
        let mut version = 0;
        self.current.send_modify(|model| {
            model.version += 1;
            model.predictor = predictor;
            version = model.version;
        });
        version
    }

    /// Receiver notified on every swap
    pub fn subscribe(&self) -> watch::Receiver<ActiveModel> {
        self.current.subscribe()
    }
}

/// Least-squares fit of one metric against time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LinearTrend {
    slope_per_sec: f64,
    r_squared: f64,
}

impl LinearTrend {
    fn fit(points: &[(f64, f64)]) -> Option<Self> {
        let n = points.len() as f64;
        if points.len() < 2 {
            return None;
        }

        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for &(x, y) in points {
            let dx = x - mean_x;
            let dy = y - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }

        if sxx == 0.0 {
            return None;
        }

        let r_squared = if syy == 0.0 { 1.0 } else { (sxy * sxy) / (sxx * syy) };

        Some(Self {
            slope_per_sec: sxy / sxx,
            r_squared: r_squared.clamp(0.0, 1.0),
        })
    }
}

/// Reference predictor extrapolating the linear trend of cpu and memory
/// over the forecast horizon. Untrained models forecast the latest values
/// with zero confidence.
#[derive(Debug, Clone)]
pub struct TrendPredictor {
    horizon_secs: u64,
    generation: u64,
    cpu: LinearTrend,
    memory: LinearTrend,
    trained_on: usize,
}

impl TrendPredictor {
    pub fn new(horizon_secs: u64) -> Self {
        Self {
            horizon_secs,
            generation: 0,
            cpu: LinearTrend::default(),
            memory: LinearTrend::default(),
            trained_on: 0,
        }
    }

    fn confidence(&self) -> f64 {
        if self.trained_on == 0 {
            return 0.0;
        }
        (self.cpu.r_squared + self.memory.r_squared) / 2.0 * 100.0
    }
}

#[async_trait]
impl Predictor for TrendPredictor {
    async fn forecast(&self, window: &[Snapshot]) -> PredictorResult<Forecast> {
        let latest = window
            .last()
            .ok_or_else(|| PredictorError::unavailable("empty snapshot window"))?;

        let horizon = self.horizon_secs as f64;
        Ok(Forecast {
            horizon_seconds: self.horizon_secs,
            predicted_cpu_percent: (latest.cpu_percent + self.cpu.slope_per_sec * horizon).clamp(0.0, 100.0),
            predicted_memory_percent: (latest.memory_percent + self.memory.slope_per_sec * horizon)
                .clamp(0.0, 100.0),
            confidence_percent: self.confidence(),
        })
    }

    async fn retrain(&self, window: &[Snapshot]) -> PredictorResult<Arc<dyn Predictor>> {
        let first = window.first().ok_or_else(|| {
            PredictorError::retrain_failed("need at least 2 snapshots, got 0")
        })?;

        if window.len() < 2 {
            return Err(PredictorError::retrain_failed(format!(
                "need at least 2 snapshots, got {}",
                window.len()
            )));
        }

        let seconds = |s: &Snapshot| (s.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
        let cpu_points: Vec<_> = window.iter().map(|s| (seconds(s), s.cpu_percent)).collect();
        let memory_points: Vec<_> = window.iter().map(|s| (seconds(s), s.memory_percent)).collect();

        let cpu = LinearTrend::fit(&cpu_points)
            .ok_or_else(|| PredictorError::retrain_failed("snapshots share a single timestamp"))?;
        let memory = LinearTrend::fit(&memory_points)
            .ok_or_else(|| PredictorError::retrain_failed("snapshots share a single timestamp"))?;

        Ok(Arc::new(Self {
            horizon_secs: self.horizon_secs,
            generation: self.generation + 1,
            cpu,
            memory,
            trained_on: window.len(),
        }))
    }

    fn name(&self) -> &str {
        "linear-trend"
    }
}
