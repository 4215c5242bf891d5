//! Error handling for the DevSim monitoring service
//!
//! This module provides the error taxonomy for every monitor operation.
//! Only configuration errors are fatal; source, predictor and notifier
//! failures are recoverable and are contained by the component that
//! encountered them.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// The main error type for the monitoring service
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Invalid configuration, raised at construction only
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Metrics source failures
    #[error("Metrics source error: {0}")]
    Source(#[from] SourceError),

    /// Predictor failures
    #[error("Predictor error: {0}")]
    Predictor(#[from] PredictorError),

    /// Notifier failures
    #[error("Notifier error: {0}")]
    Notify(#[from] NotifyError),

    /// Scheduling errors (double start, task join failures)
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Prometheus registry errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic errors
    #[error("{0}")]
    Generic(String),
}

/// Configuration errors. Every variant is an `InvalidConfig` failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

/// Metrics source errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Metrics source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Metrics source timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Predictor errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictorError {
    #[error("Predictor unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Predictor timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Predictor retrain failed: {reason}")]
    RetrainFailed { reason: String },
}

/// Notifier errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Alert delivery failed: {reason}")]
    DeliveryFailed { reason: String },

    #[error("Alert delivery timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MonitorError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for metrics source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A specialized result type for predictor operations
pub type PredictorResult<T> = std::result::Result<T, PredictorError>;

/// A specialized result type for notifier operations
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

impl MonitorError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MonitorError::Config(_) => false,
            MonitorError::Scheduling(_) => false,
            MonitorError::Metrics(_) => false,
            MonitorError::Io(io_error) => {
                matches!(io_error.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
            }
            _ => true,
        }
    }

    /// Check if this is an `InvalidConfig` failure
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, MonitorError::Config(_))
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "config",
            MonitorError::Source(_) => "source",
            MonitorError::Predictor(_) => "predictor",
            MonitorError::Notify(_) => "notify",
            MonitorError::Scheduling(_) => "scheduling",
            MonitorError::Metrics(_) => "metrics",
            MonitorError::Io(_) => "io",
            MonitorError::Generic(_) => "generic",
        }
    }
}

impl SourceError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        SourceError::Unavailable { reason: reason.into() }
    }
}

impl PredictorError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        PredictorError::Unavailable { reason: reason.into() }
    }

    pub fn retrain_failed(reason: impl Into<String>) -> Self {
        PredictorError::RetrainFailed { reason: reason.into() }
    }
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: impl ToString) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<String> for MonitorError {
    fn from(msg: String) -> Self {
        MonitorError::Generic(msg)
    }
}

impl From<&str> for MonitorError {
    fn from(msg: &str) -> Self {
        MonitorError::Generic(msg.to_string())
    }
}
