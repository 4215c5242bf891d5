//! Configuration management for the DevSim monitoring service
//!
//! Configuration is layered: an environment preset (production,
//! development or experimental) is selected first, a TOML file is merged
//! over it, and `DEVSIM_*` environment variables override individual
//! fields. The result is validated once and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::MAX_SUPPRESSION_WINDOW_SECS;
use crate::error::{ConfigError, ConfigResult};
use crate::model::Metric;

/// Environment variable selecting the preset
pub const ENV_VAR: &str = "DEVSIM_ENV";

/// Longest accepted predictive window, one week
pub const MAX_PREDICTIVE_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound on snapshots held for forecasting and retraining
pub const MAX_WINDOW_SNAPSHOTS: usize = 100_000;

/// Deployment environment, each with its own preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Experimental,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Experimental => "experimental",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "experimental" | "exp" => Ok(Environment::Experimental),
            other => Err(ConfigError::invalid("environment", other)),
        }
    }
}

/// Main configuration structure for the monitoring service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Environment the preset was taken from
    pub environment: Environment,

    /// Sampling schedule
    pub sampling: SamplingConfig,

    /// Thresholds and alert policy
    pub alerting: AlertingConfig,

    /// Predictive analysis and retraining
    pub prediction: PredictionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sampling schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling interval in milliseconds
    pub interval_ms: u64,

    /// Upper bound on a single `MetricsSource::sample` call
    pub sample_timeout_ms: u64,
}

/// Alerting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Per-metric thresholds in percent, keyed by metric name
    pub thresholds: BTreeMap<String, f64>,

    /// Values above `threshold * critical_multiplier` are critical
    pub critical_multiplier: f64,

    /// Consecutive quiet ticks before an alert clears
    pub hysteresis_ticks: u32,

    /// Window recorded on each alert as `suppress_until`
    pub suppression_window_secs: u64,

    /// Upper bound on a single `Notifier::notify` call
    pub notify_timeout_ms: u64,
}

/// Predictive analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Enable forecasting and background retraining
    pub enabled: bool,

    /// Retraining interval in milliseconds
    pub retrain_interval_ms: u64,

    /// Length of the snapshot window fed to the predictor, also the forecast horizon
    pub window_secs: u64,

    /// Upper bound on a single forecast call
    pub forecast_timeout_ms: u64,

    /// Upper bound on a single retrain call
    pub retrain_timeout_ms: u64,

    /// Predicted findings below this confidence are reported as info
    pub min_confidence: f64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Emit JSON lines instead of text
    pub json: bool,

    /// Optional log file, written in addition to the console
    pub file_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Production)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            sample_timeout_ms: 5_000,
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            thresholds: uniform_thresholds(80.0),
            critical_multiplier: 1.2,
            hysteresis_ticks: 1,
            suppression_window_secs: 300,
            notify_timeout_ms: 2_000,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retrain_interval_ms: 120_000, // 2 minutes
            window_secs: 300,             // 5 minutes
            forecast_timeout_ms: 2_000,
            retrain_timeout_ms: 30_000,
            min_confidence: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_path: None,
        }
    }
}

fn uniform_thresholds(value: f64) -> BTreeMap<String, f64> {
    Metric::ALL
        .iter()
        .map(|metric| (metric.as_str().to_string(), value))
        .collect()
}

impl MonitorConfig {
    /// Preset for an environment
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Self {
            environment,
            sampling: SamplingConfig::default(),
            alerting: AlertingConfig::default(),
            prediction: PredictionConfig::default(),
            logging: LoggingConfig::default(),
        };

        match environment {
            Environment::Production => {}
            Environment::Development => {
                config.sampling.interval_ms = 5_000;
                config.alerting.thresholds = uniform_thresholds(90.0);
                config.logging.level = "debug".to_string();
            }
            Environment::Experimental => {
                config.sampling.interval_ms = 30_000;
                config.alerting.thresholds = uniform_thresholds(75.0);
                config.prediction.enabled = true;
            }
        }

        config
    }

    /// Environment selected by `DEVSIM_ENV`, production when unset or unknown
    pub fn environment_from_env() -> Environment {
        match std::env::var(ENV_VAR) {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown {} value {:?}, using production", ENV_VAR, value);
                Environment::Production
            }),
            Err(_) => Environment::Production,
        }
    }

    /// Load configuration from a TOML file, layered over its environment preset
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.to_string_lossy().to_string() })?;

        let config = Self::from_toml_str(&content, Self::environment_from_env())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML, merging it over the preset of the environment it names
    /// (or `fallback` when it names none)
    pub fn from_toml_str(content: &str, fallback: Environment) -> ConfigResult<Self> {
        let overlay: toml::Value = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        let environment = match overlay.get("environment").and_then(|v| v.as_str()) {
            Some(name) => name.parse()?,
            None => fallback,
        };

        let mut base = toml::Value::try_from(Self::for_environment(environment))
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;
        merge_values(&mut base, overlay);

        base.try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError { reason: e.to_string() })
    }

    /// Load configuration from the environment preset and `DEVSIM_*` variables
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::for_environment(Self::environment_from_env());
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback order: preset -> file -> env overrides
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) if path.as_ref().exists() => {
                let content = fs::read_to_string(path.as_ref()).map_err(|_| ConfigError::FileNotFound {
                    path: path.as_ref().to_string_lossy().to_string(),
                })?;
                Self::from_toml_str(&content, Self::environment_from_env())?
            }
            Some(path) => {
                return Err(ConfigError::FileNotFound {
                    path: path.as_ref().to_string_lossy().to_string(),
                })
            }
            None => match Self::default_config_path() {
                Ok(path) if path.exists() => {
                    let content = fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
                        path: path.to_string_lossy().to_string(),
                    })?;
                    Self::from_toml_str(&content, Self::environment_from_env())?
                }
                _ => Self::for_environment(Self::environment_from_env()),
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override individual fields from `DEVSIM_*` variables
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(interval) = std::env::var("DEVSIM_INTERVAL_MS") {
            self.sampling.interval_ms = parse_env("DEVSIM_INTERVAL_MS", &interval)?;
        }

        if let Ok(threshold) = std::env::var("DEVSIM_ALERT_THRESHOLD") {
            let value: f64 = parse_env("DEVSIM_ALERT_THRESHOLD", &threshold)?;
            self.alerting.thresholds = uniform_thresholds(value);
        }

        if let Ok(ticks) = std::env::var("DEVSIM_HYSTERESIS_TICKS") {
            self.alerting.hysteresis_ticks = parse_env("DEVSIM_HYSTERESIS_TICKS", &ticks)?;
        }

        if let Ok(enabled) = std::env::var("DEVSIM_AI_ENABLED") {
            self.prediction.enabled = parse_env("DEVSIM_AI_ENABLED", &enabled)?;
        }

        if let Ok(level) = std::env::var("DEVSIM_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration. Every failure is an `InvalidConfig`.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::invalid("sampling.interval_ms", 0));
        }

        if self.sampling.sample_timeout_ms == 0 {
            return Err(ConfigError::invalid("sampling.sample_timeout_ms", 0));
        }

        // Parses names and checks ranges
        self.alerting.metric_thresholds()?;

        if !self.alerting.critical_multiplier.is_finite() || self.alerting.critical_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "alerting.critical_multiplier",
                self.alerting.critical_multiplier,
            ));
        }

        if self.alerting.hysteresis_ticks < 1 {
            return Err(ConfigError::invalid("alerting.hysteresis_ticks", self.alerting.hysteresis_ticks));
        }

        if self.alerting.notify_timeout_ms == 0 {
            return Err(ConfigError::invalid("alerting.notify_timeout_ms", 0));
        }

        if self.alerting.suppression_window_secs > MAX_SUPPRESSION_WINDOW_SECS {
            return Err(ConfigError::invalid(
                "alerting.suppression_window_secs",
                self.alerting.suppression_window_secs,
            ));
        }

        if self.prediction.enabled {
            if self.prediction.window_secs == 0 || self.prediction.window_secs > MAX_PREDICTIVE_WINDOW_SECS {
                return Err(ConfigError::invalid("prediction.window_secs", self.prediction.window_secs));
            }

            if self.prediction.retrain_interval_ms == 0 {
                return Err(ConfigError::invalid("prediction.retrain_interval_ms", 0));
            }

            if self.prediction.forecast_timeout_ms == 0 {
                return Err(ConfigError::invalid("prediction.forecast_timeout_ms", 0));
            }

            if self.prediction.retrain_timeout_ms == 0 {
                return Err(ConfigError::invalid("prediction.retrain_timeout_ms", 0));
            }

            let confidence = self.prediction.min_confidence;
            if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
                return Err(ConfigError::invalid("prediction.min_confidence", confidence));
            }
        }

        Ok(())
    }

    /// Number of snapshots covering the predictive window, between one
    /// and [`MAX_WINDOW_SNAPSHOTS`]
    pub fn window_capacity(&self) -> usize {
        let window_ms = self.prediction.window_secs.saturating_mul(1000);
        let samples = window_ms.div_ceil(self.sampling.interval_ms.max(1));
        usize::try_from(samples).unwrap_or(MAX_WINDOW_SNAPSHOTS).clamp(1, MAX_WINDOW_SNAPSHOTS)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.sampling.interval_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sampling.sample_timeout_ms)
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_millis(self.prediction.retrain_interval_ms)
    }

    pub fn forecast_timeout(&self) -> Duration {
        Duration::from_millis(self.prediction.forecast_timeout_ms)
    }

    pub fn retrain_timeout(&self) -> Duration {
        Duration::from_millis(self.prediction.retrain_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.alerting.notify_timeout_ms)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("devsim").join("monitor.toml"))
            .ok_or_else(|| ConfigError::ValidationFailed {
                reason: "Unable to determine config directory".to_string(),
            })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::ValidationFailed {
                reason: format!("Unable to create config directory: {}", parent.display()),
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationFailed { reason: e.to_string() })?;

        fs::write(path, content).map_err(|_| ConfigError::ValidationFailed {
            reason: format!("Unable to write {}", path.display()),
        })?;

        Ok(())
    }
}

impl AlertingConfig {
    /// Thresholds keyed by metric, rejecting unknown names and values outside [0, 100]
    pub fn metric_thresholds(&self) -> ConfigResult<BTreeMap<Metric, f64>> {
        let mut thresholds = BTreeMap::new();

        for (name, &value) in &self.thresholds {
            let field = format!("alerting.thresholds.{}", name);
            let metric: Metric = name.parse().map_err(|_| ConfigError::invalid(&field, name))?;

            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::invalid(&field, value));
            }

            if thresholds.insert(metric, value).is_some() {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("more than one threshold for {}", metric),
                });
            }
        }

        Ok(thresholds)
    }
}

fn parse_env<T: FromStr>(field: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Recursively merge `overlay` into `base`; tables merge, everything else replaces
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        merge_values(existing, value);
                    }
                    _ => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
