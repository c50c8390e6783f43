//! Service configuration

use crate::ensemble::AdaptationConfig;
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "PREDICTION";

/// Prediction service configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfig {
    /// Upper bound on a single ensemble training run
    #[serde(default = "default_training_timeout")]
    pub training_timeout_ms: u64,

    /// Results kept in the global prediction history
    #[serde(default = "default_prediction_history_limit")]
    pub prediction_history_limit: usize,

    /// Accuracy snapshots kept by the quality monitor
    #[serde(default = "default_monitor_history_limit")]
    pub monitor_history_limit: usize,

    /// Bias and calibration snapshots kept by the quality monitor
    #[serde(default = "default_bias_history_limit")]
    pub bias_history_limit: usize,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Horizon used when a prediction request does not give one
    #[serde(default = "default_horizon")]
    pub default_horizon: usize,

    #[serde(default = "default_adaptation_window")]
    pub adaptation_window: usize,

    #[serde(default = "default_adaptation_threshold")]
    pub adaptation_threshold: f64,

    #[serde(default = "default_drift_window")]
    pub drift_window: usize,

    /// Largest training window of a stream predictor
    #[serde(default = "default_realtime_window")]
    pub realtime_window: usize,
}

fn default_training_timeout() -> u64 {
    30_000
}

fn default_prediction_history_limit() -> usize {
    1000
}

fn default_monitor_history_limit() -> usize {
    1000
}

fn default_bias_history_limit() -> usize {
    100
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_horizon() -> usize {
    1
}

fn default_adaptation_window() -> usize {
    5
}

fn default_adaptation_threshold() -> f64 {
    0.1
}

fn default_drift_window() -> usize {
    30
}

fn default_realtime_window() -> usize {
    50
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            training_timeout_ms: default_training_timeout(),
            prediction_history_limit: default_prediction_history_limit(),
            monitor_history_limit: default_monitor_history_limit(),
            bias_history_limit: default_bias_history_limit(),
            event_channel_capacity: default_event_channel_capacity(),
            default_horizon: default_horizon(),
            adaptation_window: default_adaptation_window(),
            adaptation_threshold: default_adaptation_threshold(),
            drift_window: default_drift_window(),
            realtime_window: default_realtime_window(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `PREDICTION_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from a config file, with environment variables taking precedence
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn training_timeout(&self) -> Duration {
        Duration::from_millis(self.training_timeout_ms)
    }

    pub fn adaptation(&self) -> AdaptationConfig {
        AdaptationConfig {
            window: self.adaptation_window.max(1),
            threshold: self.adaptation_threshold,
            drift_window: self.drift_window.max(1),
            ..AdaptationConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.event_channel_capacity, 100);
        assert_eq!(config.realtime_window, 50);
        assert_eq!(config.training_timeout(), Duration::from_secs(30));
        assert_eq!(config.adaptation().window, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "training_timeout_ms = 500\ndefault_horizon = 4").unwrap();
        let config = ServiceConfig::load_from(file.path()).unwrap();
        assert_eq!(config.training_timeout_ms, 500);
        assert_eq!(config.default_horizon, 4);
        assert_eq!(config.drift_window, 30);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.prediction_history_limit, 1000);
    }
}
