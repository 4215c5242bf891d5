//! DevSim monitoring service library
//!
//! This library provides an environment-aware health-monitoring scheduler:
//! periodic sampling of system metrics, threshold and predictive analysis,
//! alert escalation with hysteresis, and background retraining of a
//! pluggable predictor that never blocks sampling.

pub mod alert;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod model;
pub mod notifier;
pub mod predictor;
pub mod retrain;
pub mod sampler;
pub mod schedule;
pub mod service;
pub mod source;
pub mod window;

// Re-export commonly used types
pub use alert::{AlertEvent, AlertManager, AlertState, HealthStatus};
pub use analyzer::{evaluate, AnalysisPolicy};
pub use config::{Environment, MonitorConfig};
pub use error::{ConfigError, MonitorError, NotifyError, PredictorError, Result, SourceError};
pub use event::MonitorEvent;
pub use metrics::MonitorMetrics;
pub use model::{Finding, Forecast, Metric, Severity, Snapshot, SourceKind};
pub use notifier::{LogNotifier, Notifier};
pub use predictor::{ActiveModel, Predictor, PredictorHandle, TrendPredictor};
pub use retrain::RetrainScheduler;
pub use sampler::{Sampler, TickHandler};
pub use service::{MonitorService, ServiceState, ServiceStatus, TickReport, TickStats};
pub use source::{MetricsSource, RequestCounter, SysinfoSource};
pub use window::SnapshotWindow;
