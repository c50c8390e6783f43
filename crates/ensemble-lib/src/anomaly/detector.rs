//! Statistical anomaly detection
//!
//! Each point is scored against the rest of the scanned series, either by
//! leave-one-out z-score or by its distance outside the IQR fences.

use super::report::{
    contributing_factors, explanation_text, recommended_action, Anomaly, AnomalyExplanation,
    AnomalyReport, AnomalyType, Severity,
};
use crate::error::{PredictionError, Result};
use crate::models::{MetricsMap, PredictionData, PredictionResult, TrainingResult};
use crate::predictor::Predictor;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Default z-score threshold
pub const DEFAULT_THRESHOLD: f64 = 2.5;

/// Score assigned when the reference sample has no spread
pub const MAX_SCORE: f64 = 100.0;

/// Neighbours on each side used as local context
const CONTEXT_RADIUS: usize = 5;

const IQR_FENCE: f64 = 1.5;

const MIN_DATA_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    #[default]
    ZScore,
    Iqr,
}

/// Summary statistics of the training baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
}

impl BaselineStats {
    fn from_values(values: &[f64]) -> Self {
        let (q1, q3) = stats::quartiles(values);
        Self {
            mean: stats::mean(values),
            std_dev: stats::std_dev(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            q1,
            q3,
            iqr: q3 - q1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDetectionEngine {
    model_id: String,
    method: DetectionMethod,
    threshold: f64,
    trained: bool,
    baseline: Vec<f64>,
    baseline_stats: BaselineStats,
    history: Vec<TrainingResult>,
}

impl AnomalyDetectionEngine {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_method(model_id, DetectionMethod::ZScore, DEFAULT_THRESHOLD)
    }

    pub fn with_method(model_id: impl Into<String>, method: DetectionMethod, threshold: f64) -> Self {
        Self {
            model_id: model_id.into(),
            method,
            threshold,
            trained: false,
            baseline: Vec::new(),
            baseline_stats: BaselineStats::default(),
            history: Vec::new(),
        }
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn baseline_stats(&self) -> &BaselineStats {
        &self.baseline_stats
    }

    /// Scan `data` and report every flagged point
    pub fn detect_anomalies(&self, data: &PredictionData) -> AnomalyReport {
        let values = data.values();
        let fences = match self.method {
            DetectionMethod::Iqr => Some(stats::quartiles(&values)),
            DetectionMethod::ZScore => None,
        };

        let n = values.len();
        let sum: f64 = values.iter().sum();
        let sum_sq: f64 = values.iter().map(|v| v * v).sum();

        let anomalies: Vec<Anomaly> = values
            .iter()
            .enumerate()
            .filter_map(|(i, &value)| {
                // Statistics of every point except this one
                let (expected, std_dev) = if n > 1 {
                    let m = (sum - value) / (n - 1) as f64;
                    let var = ((sum_sq - value * value) / (n - 1) as f64 - m * m).max(0.0);
                    (m, var.sqrt())
                } else {
                    (value, 0.0)
                };
                let (flagged, score) = match fences {
                    None => {
                        let score = zscore(value, expected, std_dev);
                        (score > self.threshold, score)
                    }
                    Some((q1, q3)) => iqr_score(value, q1, q3),
                };
                flagged.then(|| Anomaly {
                    index: i,
                    timestamp: data.points[i].timestamp,
                    value,
                    expected_value: expected,
                    score,
                    anomaly_type: classify(&values, i, expected),
                    severity: Severity::from_score(score),
                })
            })
            .collect();

        debug!(
            model_id = %self.model_id,
            scanned = values.len(),
            anomalies = anomalies.len(),
            "Anomaly scan complete"
        );
        AnomalyReport::new(anomalies, values.len())
    }

    /// Human-readable explanation for each anomaly
    pub fn explain_anomalies(&self, anomalies: &[Anomaly]) -> Vec<AnomalyExplanation> {
        anomalies
            .iter()
            .map(|a| AnomalyExplanation {
                index: a.index,
                reason: explanation_text(a),
                factors: contributing_factors(a),
                recommended_action: recommended_action(a.severity).to_string(),
                context: self.baseline_context(a.value),
            })
            .collect()
    }

    /// Training values around the closest baseline match of `value`
    fn baseline_context(&self, value: f64) -> Vec<f64> {
        let Some(idx) = self
            .baseline
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - value)
                    .abs()
                    .partial_cmp(&(*b - value).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
        else {
            return Vec::new();
        };
        let start = idx.saturating_sub(CONTEXT_RADIUS);
        let end = (idx + CONTEXT_RADIUS + 1).min(self.baseline.len());
        self.baseline[start..end].to_vec()
    }
}

fn zscore(value: f64, mean: f64, std_dev: f64) -> f64 {
    let deviation = (value - mean).abs();
    // Running-sum variance leaves rounding noise on flat samples
    let tolerance = 1e-9 * (1.0 + mean.abs());
    if std_dev < tolerance {
        return if deviation < tolerance { 0.0 } else { MAX_SCORE };
    }
    (deviation / std_dev).min(MAX_SCORE)
}

/// (flagged, distance outside the fences in IQR units)
fn iqr_score(value: f64, q1: f64, q3: f64) -> (bool, f64) {
    let iqr = q3 - q1;
    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;
    let distance = if value < lower {
        lower - value
    } else if value > upper {
        value - upper
    } else {
        return (false, 0.0);
    };
    let score = if iqr < f64::EPSILON {
        MAX_SCORE
    } else {
        distance / iqr
    };
    (true, score)
}

/// Compare against the mean of up to five neighbours on each side
fn classify(values: &[f64], index: usize, fallback_mean: f64) -> AnomalyType {
    let start = index.saturating_sub(CONTEXT_RADIUS);
    let end = (index + CONTEXT_RADIUS + 1).min(values.len());
    let context: Vec<f64> = (start..end)
        .filter(|j| *j != index)
        .map(|j| values[j])
        .collect();
    let context_mean = if context.is_empty() {
        fallback_mean
    } else {
        stats::mean(&context)
    };
    let value = values[index];
    if value > context_mean * 1.5 {
        AnomalyType::Spike
    } else if value < context_mean * 0.5 {
        AnomalyType::Dip
    } else {
        AnomalyType::TrendBreak
    }
}

impl Predictor for AnomalyDetectionEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn algorithm(&self) -> &'static str {
        match self.method {
            DetectionMethod::ZScore => "statistical_zscore",
            DetectionMethod::Iqr => "statistical_iqr",
        }
    }

    fn min_data_points(&self) -> usize {
        MIN_DATA_POINTS
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn training_history(&self) -> &[TrainingResult] {
        &self.history
    }

    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult> {
        let start = Instant::now();
        if data.len() < MIN_DATA_POINTS {
            return Err(PredictionError::insufficient_data(
                &self.model_id,
                MIN_DATA_POINTS,
                data.len(),
            ));
        }
        self.baseline = data.values();
        self.baseline_stats = BaselineStats::from_values(&self.baseline);
        let report = self.detect_anomalies(data);
        self.trained = true;

        let s = &self.baseline_stats;
        let mut metrics = MetricsMap::new();
        metrics.insert("threshold".to_string(), self.threshold);
        metrics.insert("mean".to_string(), s.mean);
        metrics.insert("std".to_string(), s.std_dev);
        metrics.insert("min".to_string(), s.min);
        metrics.insert("max".to_string(), s.max);
        metrics.insert("q1".to_string(), s.q1);
        metrics.insert("q3".to_string(), s.q3);
        metrics.insert("iqr".to_string(), s.iqr);
        metrics.insert("anomaly_rate".to_string(), report.anomaly_rate);

        let result = TrainingResult {
            model_id: self.model_id.clone(),
            algorithm: self.algorithm().to_string(),
            training_score: 1.0 - report.anomaly_rate,
            validation_score: 1.0 - report.anomaly_rate,
            training_time_ms: start.elapsed().as_millis() as u64,
            feature_importance: Default::default(),
            metrics,
            trained_at: chrono::Utc::now().timestamp_millis(),
        };
        self.history.push(result.clone());
        Ok(result)
    }

    /// Anomaly count of the supplied window, repeated per step
    ///
    /// An empty window scans the training baseline.
    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult> {
        if !self.trained {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        if horizon == 0 {
            return Err(PredictionError::InvalidInput(
                "horizon must be at least 1".to_string(),
            ));
        }
        let report = if data.is_empty() {
            self.detect_anomalies(&PredictionData::from_values(&self.baseline))
        } else {
            self.detect_anomalies(data)
        };
        Ok(PredictionResult::new(
            &self.model_id,
            self.algorithm(),
            vec![report.total() as f64; horizon],
            1.0 - report.anomaly_rate,
            None,
        ))
    }

    fn evaluate(&self, test_data: &PredictionData) -> Result<MetricsMap> {
        if !self.trained {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        let report = self.detect_anomalies(test_data);
        let mut metrics = MetricsMap::new();
        metrics.insert("anomaly_count".to_string(), report.total() as f64);
        metrics.insert("anomaly_rate".to_string(), report.anomaly_rate);
        metrics.insert("accuracy".to_string(), 1.0 - report.anomaly_rate);
        metrics.insert("severity".to_string(), report.aggregate_severity);
        Ok(metrics)
    }
}
