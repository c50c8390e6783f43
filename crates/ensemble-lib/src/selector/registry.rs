//! Catalogue of model types the selector can propose

use crate::anomaly::{AnomalyDetectionEngine, DetectionMethod, DEFAULT_THRESHOLD};
use crate::error::{PredictionError, Result};
use crate::models::TaskType;
use crate::predictor::{
    CausalInferenceEngine, ModelInstance, TimeSeriesEngine, TimeSeriesParams, EDGE_THRESHOLD,
};
use serde::{Deserialize, Serialize};

/// Scale that maps a normalized complexity onto a data-size capacity
pub const COMPLEXITY_SCALE: f64 = 1000.0;

/// How a registry entry is turned into a live predictor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum EngineKind {
    TimeSeries { params: TimeSeriesParams },
    Anomaly { method: DetectionMethod, threshold: f64 },
    /// `edge_threshold` 0 fits every feature, above 0 only correlated ones
    Causal { edge_threshold: f64 },
}

impl EngineKind {
    pub fn build(&self, instance_id: &str) -> ModelInstance {
        match *self {
            Self::TimeSeries { params } => TimeSeriesEngine::with_params(instance_id, params).into(),
            Self::Anomaly { method, threshold } => {
                AnomalyDetectionEngine::with_method(instance_id, method, threshold).into()
            }
            Self::Causal { edge_threshold } => {
                CausalInferenceEngine::with_edge_threshold(instance_id, edge_threshold).into()
            }
        }
    }
}

/// Data shape a model only makes sense for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRequirement {
    Seasonality,
    Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    pub task_types: Vec<TaskType>,
    /// Normalized to [0, 1]
    pub complexity: f64,
    pub expected_accuracy: f64,
    pub avg_training_time_ms: u64,
    pub memory_mb: u64,
    pub min_data_points: usize,
    pub supports_realtime: bool,
    /// Parameter stability in [0, 1]
    pub stability: f64,
    #[serde(default)]
    pub requires: Option<DataRequirement>,
    pub engine: EngineKind,
}

impl ModelSpec {
    /// Data size this model is sized for
    pub fn capacity(&self) -> f64 {
        self.complexity * COMPLEXITY_SCALE
    }

    pub fn supports(&self, task_type: TaskType) -> bool {
        self.task_types.contains(&task_type)
    }
}

/// Ordered registry; iteration order breaks selection ties
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            specs: builtin_specs(),
        }
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Add or replace an entry; a replaced entry keeps its position
    pub fn register(&mut self, spec: ModelSpec) {
        match self.specs.iter_mut().find(|s| s.id == spec.id) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn candidates(&self, task_type: TaskType) -> impl Iterator<Item = &ModelSpec> {
        self.specs.iter().filter(move |s| s.supports(task_type))
    }

    pub fn instantiate(&self, model_id: &str, instance_id: &str) -> Result<ModelInstance> {
        self.get(model_id)
            .map(|spec| spec.engine.build(instance_id))
            .ok_or_else(|| PredictionError::UnsupportedAlgorithm {
                model_id: model_id.to_string(),
            })
    }
}

fn builtin_specs() -> Vec<ModelSpec> {
    use TaskType::*;
    vec![
        ModelSpec {
            id: "exponential_smoothing".to_string(),
            name: "Exponential smoothing".to_string(),
            task_types: vec![Forecasting],
            complexity: 0.3,
            expected_accuracy: 0.8,
            avg_training_time_ms: 100,
            memory_mb: 50,
            min_data_points: 13,
            supports_realtime: true,
            stability: 0.9,
            requires: None,
            engine: EngineKind::TimeSeries {
                params: TimeSeriesParams::default(),
            },
        },
        ModelSpec {
            id: "holt_winters".to_string(),
            name: "Seasonal smoothing".to_string(),
            task_types: vec![Forecasting],
            complexity: 0.6,
            expected_accuracy: 0.85,
            avg_training_time_ms: 300,
            memory_mb: 120,
            min_data_points: 25,
            supports_realtime: false,
            stability: 0.75,
            requires: Some(DataRequirement::Seasonality),
            engine: EngineKind::TimeSeries {
                params: TimeSeriesParams {
                    window_size: 24,
                    alpha: 0.2,
                    beta: 0.2,
                    gamma: 0.3,
                },
            },
        },
        ModelSpec {
            id: "trend_model".to_string(),
            name: "Short-window trend follower".to_string(),
            task_types: vec![Forecasting],
            complexity: 0.4,
            expected_accuracy: 0.75,
            avg_training_time_ms: 80,
            memory_mb: 40,
            min_data_points: 10,
            supports_realtime: true,
            stability: 0.85,
            requires: Some(DataRequirement::Trend),
            engine: EngineKind::TimeSeries {
                params: TimeSeriesParams {
                    window_size: 6,
                    alpha: 0.5,
                    beta: 0.3,
                    gamma: 0.0,
                },
            },
        },
        ModelSpec {
            id: "statistical_zscore".to_string(),
            name: "Z-score anomaly detection".to_string(),
            task_types: vec![AnomalyDetection],
            complexity: 0.4,
            expected_accuracy: 0.9,
            avg_training_time_ms: 200,
            memory_mb: 100,
            min_data_points: 20,
            supports_realtime: true,
            stability: 0.8,
            requires: None,
            engine: EngineKind::Anomaly {
                method: DetectionMethod::ZScore,
                threshold: DEFAULT_THRESHOLD,
            },
        },
        ModelSpec {
            id: "statistical_iqr".to_string(),
            name: "IQR fence anomaly detection".to_string(),
            task_types: vec![AnomalyDetection],
            complexity: 0.35,
            expected_accuracy: 0.85,
            avg_training_time_ms: 150,
            memory_mb: 80,
            min_data_points: 20,
            supports_realtime: true,
            stability: 0.85,
            requires: None,
            engine: EngineKind::Anomaly {
                method: DetectionMethod::Iqr,
                threshold: DEFAULT_THRESHOLD,
            },
        },
        ModelSpec {
            id: "linear_regression".to_string(),
            name: "Linear feature regression".to_string(),
            task_types: vec![Regression, Classification],
            complexity: 0.2,
            expected_accuracy: 0.75,
            avg_training_time_ms: 50,
            memory_mb: 30,
            min_data_points: 10,
            supports_realtime: true,
            stability: 0.95,
            requires: None,
            engine: EngineKind::Causal { edge_threshold: 0.0 },
        },
        ModelSpec {
            id: "causal_inference".to_string(),
            name: "Correlation causal model".to_string(),
            task_types: vec![Regression, Classification],
            complexity: 0.5,
            expected_accuracy: 0.8,
            avg_training_time_ms: 300,
            memory_mb: 150,
            min_data_points: 20,
            supports_realtime: false,
            stability: 0.8,
            requires: None,
            engine: EngineKind::Causal {
                edge_threshold: EDGE_THRESHOLD,
            },
        },
    ]
}
