//! Confidence calibration against observed outcomes

use crate::error::{PredictionError, Result};
use crate::models::PredictionResult;
use crate::predictor::ACCURACY_TOLERANCE;
use crate::stats;
use serde::{Deserialize, Serialize};

pub const CALIBRATION_BINS: usize = 10;

/// Confidence above which a wrong prediction counts as overconfident
const OVERCONFIDENT_LEVEL: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    pub avg_confidence: f64,
    pub confidence_variance: f64,
    /// Expected calibration error over the confidence bins
    pub calibration_error: f64,
    /// Share of predictions above 0.7 confidence that were wrong
    pub overconfident_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    pub lower: f64,
    pub upper: f64,
    pub mean_confidence: f64,
    pub empirical_accuracy: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub predicted: f64,
    pub actual: f64,
    pub count: usize,
}

/// Monotone step map from raw confidence to calibrated confidence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    /// Upper confidence bound of each block, ascending
    thresholds: Vec<f64>,
    values: Vec<f64>,
}

impl IsotonicCalibrator {
    pub fn calibrate(&self, confidence: f64) -> f64 {
        if self.values.is_empty() {
            return confidence;
        }
        let idx = self
            .thresholds
            .iter()
            .position(|t| confidence <= *t)
            .unwrap_or(self.values.len() - 1);
        self.values[idx]
    }

    pub fn blocks(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub model_id: String,
    pub original_metrics: CalibrationMetrics,
    /// Metrics after applying the fitted isotonic map
    pub calibrated_metrics: CalibrationMetrics,
    pub reliability_diagram: Vec<ReliabilityBin>,
    /// Non-empty bins only
    pub calibration_curve: Vec<CalibrationPoint>,
    /// `1 - mean |predicted - actual|` over the curve
    pub improvement: f64,
    pub recommended_method: String,
    pub calibrator: IsotonicCalibrator,
    pub generated_at: i64,
}

/// Pool-adjacent-violators fit of `outcomes` against ascending `confidences`
pub fn isotonic_regression(confidences: &[f64], outcomes: &[f64]) -> IsotonicCalibrator {
    let mut pairs: Vec<(f64, f64)> = confidences
        .iter()
        .copied()
        .zip(outcomes.iter().copied())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    // (upper x, sum y, weight)
    let mut blocks: Vec<(f64, f64, f64)> = Vec::with_capacity(pairs.len());
    for (x, y) in pairs {
        blocks.push((x, y, 1.0));
        while blocks.len() > 1 {
            let n = blocks.len();
            let (_, last_sum, last_w) = blocks[n - 1];
            let (_, prev_sum, prev_w) = blocks[n - 2];
            if prev_sum / prev_w <= last_sum / last_w {
                break;
            }
            let upper = blocks[n - 1].0;
            blocks.truncate(n - 2);
            blocks.push((upper, prev_sum + last_sum, prev_w + last_w));
        }
    }

    IsotonicCalibrator {
        thresholds: blocks.iter().map(|b| b.0).collect(),
        values: blocks.iter().map(|b| b.1 / b.2).collect(),
    }
}

/// 1.0 when the prediction is within tolerance of the outcome
fn correctness(predictions: &[PredictionResult], ground_truth: &[f64]) -> Vec<f64> {
    predictions
        .iter()
        .zip(ground_truth)
        .map(|(p, actual)| {
            let predicted = p.prediction.first().unwrap_or(0.0);
            if (predicted - actual).abs() <= ACCURACY_TOLERANCE * actual.abs() {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn bin_index(confidence: f64) -> usize {
    ((confidence.clamp(0.0, 1.0) * CALIBRATION_BINS as f64) as usize).min(CALIBRATION_BINS - 1)
}

pub fn reliability_diagram(confidences: &[f64], correct: &[f64]) -> Vec<ReliabilityBin> {
    let mut sums = vec![(0.0, 0.0, 0usize); CALIBRATION_BINS];
    for (c, ok) in confidences.iter().zip(correct) {
        let bin = &mut sums[bin_index(*c)];
        bin.0 += c;
        bin.1 += ok;
        bin.2 += 1;
    }
    sums.iter()
        .enumerate()
        .map(|(i, (conf, acc, count))| {
            let n = (*count).max(1) as f64;
            ReliabilityBin {
                lower: i as f64 / CALIBRATION_BINS as f64,
                upper: (i + 1) as f64 / CALIBRATION_BINS as f64,
                mean_confidence: conf / n,
                empirical_accuracy: acc / n,
                count: *count,
            }
        })
        .collect()
}

fn calibration_metrics(confidences: &[f64], correct: &[f64]) -> CalibrationMetrics {
    let n = confidences.len().max(1) as f64;
    let diagram = reliability_diagram(confidences, correct);
    let calibration_error = diagram
        .iter()
        .map(|b| b.count as f64 / n * (b.empirical_accuracy - b.mean_confidence).abs())
        .sum();
    let confident = confidences
        .iter()
        .zip(correct)
        .filter(|(c, _)| **c > OVERCONFIDENT_LEVEL);
    let (wrong, total) = confident.fold((0usize, 0usize), |(w, t), (_, ok)| {
        (w + usize::from(*ok < 0.5), t + 1)
    });
    CalibrationMetrics {
        avg_confidence: stats::mean(confidences),
        confidence_variance: stats::variance(confidences),
        calibration_error,
        overconfident_ratio: if total == 0 {
            0.0
        } else {
            wrong as f64 / total as f64
        },
    }
}

/// Bin confidences against correctness and fit an isotonic recalibration
pub fn calibrate(
    model_id: &str,
    predictions: &[PredictionResult],
    ground_truth: &[f64],
) -> Result<CalibrationResult> {
    if predictions.is_empty() || ground_truth.is_empty() {
        return Err(PredictionError::InvalidInput(
            "calibration needs predictions and ground truth".to_string(),
        ));
    }
    let n = predictions.len().min(ground_truth.len());
    let predictions = &predictions[..n];
    let correct = correctness(predictions, &ground_truth[..n]);
    let confidences: Vec<f64> = predictions.iter().map(|p| p.confidence).collect();

    let reliability = reliability_diagram(&confidences, &correct);
    let calibration_curve: Vec<CalibrationPoint> = reliability
        .iter()
        .filter(|b| b.count > 0)
        .map(|b| CalibrationPoint {
            predicted: b.mean_confidence,
            actual: b.empirical_accuracy,
            count: b.count,
        })
        .collect();
    let deviation = stats::mean(
        &calibration_curve
            .iter()
            .map(|p| (p.predicted - p.actual).abs())
            .collect::<Vec<_>>(),
    );

    let calibrator = isotonic_regression(&confidences, &correct);
    let calibrated: Vec<f64> = confidences.iter().map(|c| calibrator.calibrate(*c)).collect();

    Ok(CalibrationResult {
        model_id: model_id.to_string(),
        original_metrics: calibration_metrics(&confidences, &correct),
        calibrated_metrics: calibration_metrics(&calibrated, &correct),
        reliability_diagram: reliability,
        calibration_curve,
        improvement: (1.0 - deviation).max(0.0),
        recommended_method: "isotonic_regression".to_string(),
        calibrator,
        generated_at: chrono::Utc::now().timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_prediction(value: f64, confidence: f64) -> PredictionResult {
        PredictionResult::new("m", "test", vec![value], confidence, None)
    }

    #[test]
    fn test_isotonic_pools_violations() {
        let calibrator = isotonic_regression(&[0.1, 0.2, 0.3, 0.4], &[0.0, 1.0, 0.0, 1.0]);
        // 1.0 then 0.0 pool into 0.5
        assert_eq!(calibrator.blocks(), 3);
        assert_eq!(calibrator.calibrate(0.1), 0.0);
        assert_eq!(calibrator.calibrate(0.25), 0.5);
        assert_eq!(calibrator.calibrate(0.9), 1.0);
    }

    #[test]
    fn test_isotonic_output_is_monotone() {
        let confidences = [0.9, 0.1, 0.5, 0.7, 0.3, 0.8];
        let outcomes = [1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let calibrator = isotonic_regression(&confidences, &outcomes);
        let mapped: Vec<f64> = (0..=10).map(|i| calibrator.calibrate(i as f64 / 10.0)).collect();
        assert!(mapped.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_overconfident_predictions() {
        let predictions = vec![
            create_test_prediction(100.0, 0.9),
            create_test_prediction(100.0, 0.9),
            create_test_prediction(100.0, 0.9),
            create_test_prediction(100.0, 0.9),
        ];
        // Only the first outcome is within 10%
        let truth = [100.0, 200.0, 200.0, 200.0];
        let result = calibrate("m", &predictions, &truth).unwrap();
        assert_eq!(result.original_metrics.overconfident_ratio, 0.75);
        assert!((result.original_metrics.calibration_error - 0.65).abs() < 1e-9);
        assert_eq!(result.calibration_curve.len(), 1);
        assert!((result.improvement - 0.35).abs() < 1e-9);
        // The fitted map pulls confidence down to the observed 25%
        assert!((result.calibrated_metrics.avg_confidence - 0.25).abs() < 1e-9);
        assert!(result.calibrated_metrics.calibration_error < 1e-9);
        assert_eq!(result.recommended_method, "isotonic_regression");
    }

    #[test]
    fn test_reliability_diagram_has_ten_bins() {
        let diagram = reliability_diagram(&[0.05, 0.95, 1.0], &[1.0, 1.0, 0.0]);
        assert_eq!(diagram.len(), CALIBRATION_BINS);
        assert_eq!(diagram[0].count, 1);
        assert_eq!(diagram[9].count, 2);
        assert!((diagram[9].empirical_accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            calibrate("m", &[], &[1.0]),
            Err(PredictionError::InvalidInput(_))
        ));
    }
}
