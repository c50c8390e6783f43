//! Post-hoc prediction quality monitoring
//!
//! The monitor is shared process-wide: every analysis appends a snapshot to
//! a bounded history and trends are computed from those histories.

mod bias;
mod calibration;

pub use bias::{
    assess_bias, demographic_parity, disparate_impact_ratio, equal_opportunity, BiasLevel, BiasMetrics,
    BiasReport, SensitiveGroups, FAIRNESS_THRESHOLD,
};
pub use calibration::{
    calibrate, isotonic_regression, reliability_diagram, CalibrationMetrics, CalibrationPoint,
    CalibrationResult, IsotonicCalibrator, ReliabilityBin, CALIBRATION_BINS,
};

use crate::error::{PredictionError, Result};
use crate::models::PredictionResult;
use crate::observability::PredictionLogger;
use crate::predictor::accuracy;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_QUALITY_HISTORY: usize = 1000;
pub const DEFAULT_BIAS_HISTORY: usize = 100;

const LOW_CONFIDENCE: f64 = 0.3;
const VERY_LOW_CONFIDENCE: f64 = 0.1;

/// Minimum change between trend windows that is not "stable"
const TREND_DELTA: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub model_id: String,
    pub accuracy: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Percent, zero actuals skipped
    pub mape: f64,
    pub r2: f64,
    pub sample_size: usize,
    pub avg_confidence: f64,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTrend {
    Improving,
    Declining,
    Stable,
}

impl QualityTrend {
    /// Mean of the last three values against the (up to) three before them
    pub fn from_series(values: &[f64]) -> Self {
        if values.len() <= 3 {
            return Self::Stable;
        }
        let split = values.len() - 3;
        let older = &values[split.saturating_sub(3)..split];
        let difference = stats::mean(&values[split..]) - stats::mean(older);
        if difference > TREND_DELTA {
            Self::Improving
        } else if difference < -TREND_DELTA {
            Self::Declining
        } else {
            Self::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityStatistics {
    pub recent_metrics: Option<QualityMetrics>,
    pub quality_trend: QualityTrend,
    pub bias_trend: QualityTrend,
    pub calibration_trend: QualityTrend,
    pub predictions_recorded: u64,
    pub low_confidence_predictions: u64,
}

/// Halve a history once it outgrows `limit`
fn trim<T>(history: &mut VecDeque<T>, limit: usize) {
    if history.len() > limit {
        let keep = (limit / 2).max(1);
        let excess = history.len() - keep;
        history.drain(..excess);
    }
}

pub struct PredictionQualityMonitor {
    quality_history: RwLock<VecDeque<QualityMetrics>>,
    bias_history: RwLock<VecDeque<BiasReport>>,
    calibration_history: RwLock<VecDeque<CalibrationResult>>,
    quality_limit: usize,
    bias_limit: usize,
    predictions_recorded: AtomicU64,
    low_confidence: AtomicU64,
    logger: PredictionLogger,
}

impl Default for PredictionQualityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_HISTORY, DEFAULT_BIAS_HISTORY)
    }
}

impl PredictionQualityMonitor {
    pub fn new(quality_limit: usize, bias_limit: usize) -> Self {
        Self {
            quality_history: RwLock::new(VecDeque::new()),
            bias_history: RwLock::new(VecDeque::new()),
            calibration_history: RwLock::new(VecDeque::new()),
            quality_limit: quality_limit.max(1),
            bias_limit: bias_limit.max(1),
            predictions_recorded: AtomicU64::new(0),
            low_confidence: AtomicU64::new(0),
            logger: PredictionLogger::new("quality-monitor"),
        }
    }

    /// Score first-step predictions against aligned ground truth
    pub fn monitor_prediction_accuracy(
        &self,
        predictions: &[PredictionResult],
        ground_truth: &[f64],
    ) -> Result<QualityMetrics> {
        if predictions.is_empty() || ground_truth.is_empty() {
            return Err(PredictionError::InvalidInput(
                "predictions and ground truth must not be empty".to_string(),
            ));
        }
        let n = predictions.len().min(ground_truth.len());
        let predicted: Vec<f64> = predictions[..n]
            .iter()
            .map(|p| p.prediction.first().unwrap_or(0.0))
            .collect();
        let actuals = &ground_truth[..n];

        let metrics = QualityMetrics {
            model_id: predictions[0].model_id.clone(),
            accuracy: accuracy(&predicted, actuals),
            mae: stats::mae(&predicted, actuals),
            rmse: stats::rmse(&predicted, actuals),
            mape: stats::mape(&predicted, actuals),
            r2: stats::r_squared(&predicted, actuals),
            sample_size: n,
            avg_confidence: stats::mean(
                &predictions[..n].iter().map(|p| p.confidence).collect::<Vec<_>>(),
            ),
            recorded_at: chrono::Utc::now().timestamp_millis(),
        };

        let mut history = self
            .quality_history
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        history.push_back(metrics.clone());
        trim(&mut history, self.quality_limit);
        Ok(metrics)
    }

    pub fn detect_prediction_bias(
        &self,
        predictions: &[PredictionResult],
        groups: &SensitiveGroups,
    ) -> BiasReport {
        let values: Vec<f64> = predictions
            .iter()
            .map(|p| p.prediction.first().unwrap_or(0.0))
            .collect();
        let model_id = predictions.first().map(|p| p.model_id.as_str()).unwrap_or("");
        let report = assess_bias(model_id, &values, groups);
        self.logger
            .log_bias_assessment(model_id, report.overall.as_str(), report.fairness_score);

        let mut history = self
            .bias_history
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        history.push_back(report.clone());
        trim(&mut history, self.bias_limit);
        report
    }

    pub fn calibrate_prediction_uncertainty(
        &self,
        predictions: &[PredictionResult],
        ground_truth: &[f64],
    ) -> Result<CalibrationResult> {
        let model_id = predictions.first().map(|p| p.model_id.as_str()).unwrap_or("");
        let result = calibrate(model_id, predictions, ground_truth)?;
        let mut history = self
            .calibration_history
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        history.push_back(result.clone());
        trim(&mut history, self.bias_limit);
        Ok(result)
    }

    /// Count a produced prediction and warn on low confidence
    pub fn record_prediction(&self, prediction: &PredictionResult) {
        self.predictions_recorded.fetch_add(1, Ordering::Relaxed);
        if prediction.confidence < LOW_CONFIDENCE {
            self.low_confidence.fetch_add(1, Ordering::Relaxed);
            self.logger.log_low_confidence(
                &prediction.model_id,
                prediction.confidence,
                prediction.confidence < VERY_LOW_CONFIDENCE,
            );
        }
    }

    pub fn get_quality_statistics(&self) -> QualityStatistics {
        let quality = self
            .quality_history
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let bias = self
            .bias_history
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let calibration = self
            .calibration_history
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        QualityStatistics {
            recent_metrics: quality.back().cloned(),
            quality_trend: QualityTrend::from_series(
                &quality.iter().map(|m| m.accuracy).collect::<Vec<_>>(),
            ),
            bias_trend: QualityTrend::from_series(
                &bias.iter().map(|r| r.overall.rank()).collect::<Vec<_>>(),
            ),
            calibration_trend: QualityTrend::from_series(
                &calibration.iter().map(|c| c.improvement).collect::<Vec<_>>(),
            ),
            predictions_recorded: self.predictions_recorded.load(Ordering::Relaxed),
            low_confidence_predictions: self.low_confidence.load(Ordering::Relaxed),
        }
    }

    pub fn quality_history_len(&self) -> usize {
        self.quality_history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn bias_history_len(&self) -> usize {
        self.bias_history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_predictions(values: &[f64], confidence: f64) -> Vec<PredictionResult> {
        values
            .iter()
            .map(|v| PredictionResult::new("model", "test", vec![*v], confidence, None))
            .collect()
    }

    #[test]
    fn test_accuracy_metrics() {
        let monitor = PredictionQualityMonitor::default();
        let predictions = create_test_predictions(&[105.0, 120.0, 0.0], 0.8);
        let metrics = monitor
            .monitor_prediction_accuracy(&predictions, &[100.0, 100.0, 0.0])
            .unwrap();
        assert!((metrics.accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.mae - 25.0 / 3.0).abs() < 1e-9);
        // Zero actual skipped: (5% + 20%) / 2
        assert!((metrics.mape - 12.5).abs() < 1e-9);
        assert!(metrics.mape.is_finite());
        assert_eq!(metrics.sample_size, 3);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let monitor = PredictionQualityMonitor::default();
        assert!(monitor.monitor_prediction_accuracy(&[], &[1.0]).is_err());
    }

    #[test]
    fn test_quality_history_halves_when_full() {
        let monitor = PredictionQualityMonitor::new(10, 4);
        let predictions = create_test_predictions(&[1.0], 0.5);
        for _ in 0..11 {
            monitor.monitor_prediction_accuracy(&predictions, &[1.0]).unwrap();
        }
        assert_eq!(monitor.quality_history_len(), 5);

        let groups = SensitiveGroups::new().with_group("a", vec![0]);
        for _ in 0..5 {
            monitor.detect_prediction_bias(&predictions, &groups);
        }
        assert_eq!(monitor.bias_history_len(), 2);
    }

    #[test]
    fn test_trend_detection() {
        assert_eq!(QualityTrend::from_series(&[0.5, 0.5]), QualityTrend::Stable);
        assert_eq!(
            QualityTrend::from_series(&[0.5, 0.5, 0.5, 0.9, 0.9, 0.9]),
            QualityTrend::Improving
        );
        assert_eq!(
            QualityTrend::from_series(&[0.9, 0.9, 0.9, 0.5, 0.5, 0.5]),
            QualityTrend::Declining
        );
        assert_eq!(
            QualityTrend::from_series(&[0.5, 0.52, 0.5, 0.51]),
            QualityTrend::Stable
        );
    }

    #[test]
    fn test_statistics_track_recent_metrics_and_confidence() {
        let monitor = PredictionQualityMonitor::default();
        assert!(monitor.get_quality_statistics().recent_metrics.is_none());
        for p in create_test_predictions(&[1.0, 2.0], 0.05) {
            monitor.record_prediction(&p);
        }
        monitor.record_prediction(&create_test_predictions(&[1.0], 0.9)[0]);
        monitor
            .monitor_prediction_accuracy(&create_test_predictions(&[1.0], 0.9), &[1.0])
            .unwrap();
        let stats = monitor.get_quality_statistics();
        assert_eq!(stats.predictions_recorded, 3);
        assert_eq!(stats.low_confidence_predictions, 2);
        assert_eq!(stats.recent_metrics.unwrap().accuracy, 1.0);
        assert_eq!(stats.quality_trend, QualityTrend::Stable);
    }

    #[test]
    fn test_calibration_is_recorded() {
        let monitor = PredictionQualityMonitor::default();
        let predictions = create_test_predictions(&[10.0, 10.0], 0.6);
        let result = monitor
            .calibrate_prediction_uncertainty(&predictions, &[10.0, 10.0])
            .unwrap();
        assert_eq!(result.model_id, "model");
        assert!((result.improvement - 0.6).abs() < 1e-9);
    }
}
