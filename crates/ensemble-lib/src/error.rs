//! Error taxonomy for the prediction subsystem

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PredictionError>;

#[derive(Debug, Error)]
pub enum PredictionError {
    /// Training data is below the model's minimum size
    #[error("insufficient data for {model_id}: required {required} points, got {actual}")]
    InsufficientData {
        model_id: String,
        required: usize,
        actual: usize,
    },

    /// Predict or evaluate was called before a successful train
    #[error("model {model_id} has not been trained")]
    ModelNotTrained { model_id: String },

    #[error("ensemble has no predictors")]
    NoPredictors,

    #[error("unsupported algorithm: {model_id}")]
    UnsupportedAlgorithm { model_id: String },

    #[error("unknown subtask type: {name}")]
    UnknownSubtaskType { name: String },

    /// Every registry candidate was filtered out by the constraints
    #[error("no eligible models for task type {task_type}")]
    NoEligibleModels { task_type: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("training timed out after {timeout_ms}ms")]
    TrainingTimeout { timeout_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PredictionError {
    pub fn insufficient_data(model_id: impl Into<String>, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            model_id: model_id.into(),
            required,
            actual,
        }
    }

    pub fn not_trained(model_id: impl Into<String>) -> Self {
        Self::ModelNotTrained {
            model_id: model_id.into(),
        }
    }

    /// Short machine-readable kind, used as a metrics and log label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::ModelNotTrained { .. } => "model_not_trained",
            Self::NoPredictors => "no_predictors",
            Self::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            Self::UnknownSubtaskType { .. } => "unknown_subtask_type",
            Self::NoEligibleModels { .. } => "no_eligible_models",
            Self::InvalidInput(_) => "invalid_input",
            Self::TaskNotFound { .. } => "task_not_found",
            Self::TrainingTimeout { .. } => "training_timeout",
            Self::Cancelled => "cancelled",
            Self::Persistence(_) => "persistence",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = PredictionError::insufficient_data("time_series", 13, 4);
        assert_eq!(
            err.to_string(),
            "insufficient data for time_series: required 13 points, got 4"
        );
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_not_trained_message() {
        let err = PredictionError::not_trained("anomaly_zscore");
        assert!(err.to_string().contains("anomaly_zscore"));
    }
}
