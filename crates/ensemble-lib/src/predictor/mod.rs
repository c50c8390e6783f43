//! Predictor contract and the concrete statistical engines
//!
//! Every model shares one lifecycle: `train` on a series, then `predict`
//! and `evaluate`. [`ModelInstance`] is the closed set of engines an
//! ensemble can hold.

mod causal;
mod time_series;

pub use causal::{
    identify_causal_effects, CausalEdge, CausalGraph, CausalInferenceEngine, CausalNode,
    EdgeDirection, Intervention, InterventionResult, NodeType, EDGE_THRESHOLD,
};
pub use time_series::{
    detect_seasonality, extract_trend, ForecastStep, ProbabilisticForecast, Seasonality,
    SeasonalityType, TimeSeriesEngine, TimeSeriesParams,
};

use crate::anomaly::AnomalyDetectionEngine;
use crate::error::{PredictionError, Result};
use crate::models::{MetricsMap, PredictionData, PredictionResult, TrainingResult};
use crate::stats;
use serde::{Deserialize, Serialize};

/// Relative tolerance for a prediction to count as accurate
pub const ACCURACY_TOLERANCE: f64 = 0.1;

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    fn model_id(&self) -> &str;

    /// Algorithm name reported in training results and methodology
    fn algorithm(&self) -> &'static str;

    /// Minimum number of points `train` accepts
    fn min_data_points(&self) -> usize;

    fn is_trained(&self) -> bool;

    /// Append-only log of successful training runs
    fn training_history(&self) -> &[TrainingResult];

    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult>;

    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult>;

    /// Walk-forward one-step evaluation: each point is predicted from the
    /// points before it.
    fn evaluate(&self, test_data: &PredictionData) -> Result<MetricsMap> {
        if !self.is_trained() {
            return Err(PredictionError::not_trained(self.model_id()));
        }
        if test_data.len() < 2 {
            return Err(PredictionError::insufficient_data(
                self.model_id(),
                2,
                test_data.len(),
            ));
        }
        let mut predictions = Vec::with_capacity(test_data.len() - 1);
        for i in 1..test_data.len() {
            let (history, _) = test_data.split_at(i);
            let result = self.predict(&history, 1)?;
            predictions.push(result.prediction.first().unwrap_or(0.0));
        }
        let actuals: Vec<f64> = test_data.values()[1..].to_vec();
        Ok(regression_metrics(&predictions, &actuals))
    }
}

/// mae, rmse, mape, r2 and tolerance accuracy for aligned series
pub fn regression_metrics(predictions: &[f64], actuals: &[f64]) -> MetricsMap {
    let mut metrics = MetricsMap::new();
    metrics.insert("mae".to_string(), stats::mae(predictions, actuals));
    metrics.insert("rmse".to_string(), stats::rmse(predictions, actuals));
    metrics.insert("mape".to_string(), stats::mape(predictions, actuals));
    metrics.insert("r2".to_string(), stats::r_squared(predictions, actuals));
    metrics.insert("accuracy".to_string(), accuracy(predictions, actuals));
    metrics
}

/// Share of predictions within [`ACCURACY_TOLERANCE`] of the actual value
pub fn accuracy(predictions: &[f64], actuals: &[f64]) -> f64 {
    let n = predictions.len().min(actuals.len());
    if n == 0 {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(actuals)
        .filter(|(p, a)| (*p - *a).abs() <= ACCURACY_TOLERANCE * a.abs())
        .count();
    correct as f64 / n as f64
}

/// The engines an ensemble can hold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelInstance {
    TimeSeries(TimeSeriesEngine),
    Anomaly(AnomalyDetectionEngine),
    Causal(CausalInferenceEngine),
}

impl ModelInstance {
    pub fn as_predictor(&self) -> &dyn Predictor {
        match self {
            Self::TimeSeries(m) => m,
            Self::Anomaly(m) => m,
            Self::Causal(m) => m,
        }
    }

    pub fn as_predictor_mut(&mut self) -> &mut dyn Predictor {
        match self {
            Self::TimeSeries(m) => m,
            Self::Anomaly(m) => m,
            Self::Causal(m) => m,
        }
    }
}

impl From<TimeSeriesEngine> for ModelInstance {
    fn from(engine: TimeSeriesEngine) -> Self {
        Self::TimeSeries(engine)
    }
}

impl From<AnomalyDetectionEngine> for ModelInstance {
    fn from(engine: AnomalyDetectionEngine) -> Self {
        Self::Anomaly(engine)
    }
}

impl From<CausalInferenceEngine> for ModelInstance {
    fn from(engine: CausalInferenceEngine) -> Self {
        Self::Causal(engine)
    }
}

impl Predictor for ModelInstance {
    fn model_id(&self) -> &str {
        self.as_predictor().model_id()
    }

    fn algorithm(&self) -> &'static str {
        self.as_predictor().algorithm()
    }

    fn min_data_points(&self) -> usize {
        self.as_predictor().min_data_points()
    }

    fn is_trained(&self) -> bool {
        self.as_predictor().is_trained()
    }

    fn training_history(&self) -> &[TrainingResult] {
        self.as_predictor().training_history()
    }

    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult> {
        self.as_predictor_mut().train(data)
    }

    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult> {
        self.as_predictor().predict(data, horizon)
    }

    fn evaluate(&self, test_data: &PredictionData) -> Result<MetricsMap> {
        self.as_predictor().evaluate(test_data)
    }
}
