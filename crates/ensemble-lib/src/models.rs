//! Core data models for the prediction subsystem

use crate::error::{PredictionError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Named metric values (mae, rmse, ...) with stable ordering
pub type MetricsMap = BTreeMap<String, f64>;

/// A single observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDataPoint {
    pub timestamp: i64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, f64>>,
}

impl PredictionDataPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            features: None,
        }
    }

    pub fn with_features(mut self, features: HashMap<String, f64>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.as_ref().and_then(|f| f.get(name).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Timeseries,
    Tabular,
    Sequential,
}

/// Ordered input series handed to predictors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionData {
    pub points: Vec<PredictionDataPoint>,
    pub data_type: DataType,
    /// Declared feature names, looked up in each point's feature map
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub target: Option<String>,
}

impl PredictionData {
    pub fn new(points: Vec<PredictionDataPoint>, data_type: DataType) -> Self {
        Self {
            points,
            data_type,
            features: Vec::new(),
            target: None,
        }
    }

    /// Build a timeseries from raw values at unit timestamps
    pub fn from_values(values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| PredictionDataPoint::new(i as i64, *v))
            .collect();
        Self::new(points, DataType::Timeseries)
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Values of one feature; points missing it yield `None`
    pub fn feature_values(&self, name: &str) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.feature(name)).collect()
    }

    /// Check the structural invariants callers rely on
    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(PredictionError::InvalidInput(
                "prediction data must not be empty".to_string(),
            ));
        }
        if let Some(p) = self.points.iter().find(|p| !p.value.is_finite()) {
            return Err(PredictionError::InvalidInput(format!(
                "non-finite value at timestamp {}",
                p.timestamp
            )));
        }
        if self.data_type == DataType::Timeseries {
            if let Some(w) = self
                .points
                .windows(2)
                .find(|w| w[1].timestamp < w[0].timestamp)
            {
                return Err(PredictionError::InvalidInput(format!(
                    "timestamps must be non-decreasing ({} follows {})",
                    w[1].timestamp, w[0].timestamp
                )));
            }
        }
        Ok(())
    }

    /// Split into a leading and trailing part, keeping metadata
    pub fn split_at(&self, index: usize) -> (Self, Self) {
        let index = index.min(self.points.len());
        let head = Self {
            points: self.points[..index].to_vec(),
            ..self.clone_meta()
        };
        let tail = Self {
            points: self.points[index..].to_vec(),
            ..self.clone_meta()
        };
        (head, tail)
    }

    /// The most recent `n` points
    pub fn tail(&self, n: usize) -> Self {
        let start = self.points.len().saturating_sub(n);
        Self {
            points: self.points[start..].to_vec(),
            ..self.clone_meta()
        }
    }

    fn clone_meta(&self) -> Self {
        Self {
            points: Vec::new(),
            data_type: self.data_type,
            features: self.features.clone(),
            target: self.target.clone(),
        }
    }
}

/// A scalar or per-step prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Scalar(f64),
    Series(Vec<f64>),
}

impl PredictionValue {
    /// Horizon 1 collapses to a scalar
    pub fn from_steps(values: Vec<f64>) -> Self {
        if values.len() == 1 {
            Self::Scalar(values[0])
        } else {
            Self::Series(values)
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Series(v) => v.clone(),
        }
    }

    pub fn first(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Series(v) => v.first().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Output of a predictor or ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Content-derived id: identical inputs give identical ids
    pub id: String,
    pub prediction: PredictionValue,
    pub confidence: f64,
    pub horizon: usize,
    pub model_id: String,
    pub methodology: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

impl PredictionResult {
    pub fn new(
        model_id: impl Into<String>,
        methodology: impl Into<String>,
        values: Vec<f64>,
        confidence: f64,
        interval: Option<ConfidenceInterval>,
    ) -> Self {
        let model_id = model_id.into();
        let horizon = values.len();
        let confidence = clamp_unit(confidence);
        let id = result_id(&model_id, horizon, &values, confidence);
        Self {
            id,
            prediction: PredictionValue::from_steps(values),
            confidence,
            horizon,
            model_id,
            methodology: methodology.into(),
            confidence_interval: interval,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.prediction.to_vec()
    }
}

fn result_id(model_id: &str, horizon: usize, values: &[f64], confidence: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update((horizon as u64).to_le_bytes());
    for v in values {
        hasher.update(v.to_bits().to_le_bytes());
    }
    hasher.update(confidence.to_bits().to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("pred-{}", &digest[..16])
}

/// Per-model training summary, appended to the predictor's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub model_id: String,
    pub algorithm: String,
    pub training_score: f64,
    pub validation_score: f64,
    pub training_time_ms: u64,
    #[serde(default)]
    pub feature_importance: BTreeMap<String, f64>,
    #[serde(default)]
    pub metrics: MetricsMap,
    pub trained_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Forecasting,
    AnomalyDetection,
    Classification,
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forecasting => "forecasting",
            Self::AnomalyDetection => "anomaly_detection",
            Self::Classification => "classification",
            Self::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Clamp into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        let data = PredictionData::new(Vec::new(), DataType::Tabular);
        assert!(matches!(
            data.validate(),
            Err(PredictionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_rejects_decreasing_timestamps() {
        let data = PredictionData::new(
            vec![
                PredictionDataPoint::new(10, 1.0),
                PredictionDataPoint::new(5, 2.0),
            ],
            DataType::Timeseries,
        );
        assert!(data.validate().is_err());

        // Tabular data has no ordering requirement
        let tabular = PredictionData {
            data_type: DataType::Tabular,
            ..data
        };
        assert!(tabular.validate().is_ok());
    }

    #[test]
    fn test_result_id_is_deterministic() {
        let a = PredictionResult::new("m", "test", vec![1.0, 2.0], 0.8, None);
        let b = PredictionResult::new("m", "test", vec![1.0, 2.0], 0.8, None);
        let c = PredictionResult::new("m", "test", vec![1.0, 2.5], 0.8, None);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_result_confidence_clamped() {
        let r = PredictionResult::new("m", "test", vec![1.0], 1.7, None);
        assert_eq!(r.confidence, 1.0);
        let r = PredictionResult::new("m", "test", vec![1.0], f64::NAN, None);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn test_horizon_one_is_scalar() {
        let r = PredictionResult::new("m", "test", vec![4.0], 0.5, None);
        assert_eq!(r.prediction, PredictionValue::Scalar(4.0));
        assert_eq!(r.horizon, 1);
    }

    #[test]
    fn test_split_and_tail_keep_metadata() {
        let data = PredictionData::from_values(&[1.0, 2.0, 3.0, 4.0]).with_target("load");
        let (head, tail) = data.split_at(3);
        assert_eq!(head.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(tail.values(), vec![4.0]);
        assert_eq!(tail.target.as_deref(), Some("load"));
        assert_eq!(data.tail(2).values(), vec![3.0, 4.0]);
    }
}
