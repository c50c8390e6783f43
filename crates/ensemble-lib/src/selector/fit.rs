//! Per-candidate fit assessment

use super::characteristics::DataCharacteristics;
use super::registry::{ModelSpec, COMPLEXITY_SCALE};
use crate::models::{clamp_unit, DataType, PredictionData};
use crate::stats;
use serde::{Deserialize, Serialize};

/// Residual spread ratio between halves that counts as heteroscedastic
const HETEROSCEDASTIC_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidualAnalysis {
    pub mean_error: f64,
    pub std_error: f64,
    pub skewness: f64,
    /// Excess kurtosis
    pub kurtosis: f64,
    /// Lag-1 autocorrelation of the residuals
    pub autocorrelation: f64,
    pub heteroscedasticity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityMetrics {
    pub parameter_stability: f64,
    pub prediction_stability: f64,
    pub temporal_stability: f64,
    pub noise_sensitivity: f64,
    /// Normalized model complexity
    pub complexity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasVarianceTradeoff {
    pub bias: f64,
    pub variance: f64,
    pub irreducible_error: f64,
    pub total_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFitAssessment {
    pub model_id: String,
    pub goodness_of_fit: f64,
    pub residual_analysis: ResidualAnalysis,
    pub stability_metrics: StabilityMetrics,
    pub bias_variance: BiasVarianceTradeoff,
    pub recommendations: Vec<String>,
}

impl ModelFitAssessment {
    /// `0.4·fit + 0.3·parameter + 0.2·prediction`, plus `0.1·complexity` when urgent
    pub fn selection_score(&self, urgent: bool) -> f64 {
        let stability = &self.stability_metrics;
        let mut score = self.goodness_of_fit * 0.4
            + stability.parameter_stability * 0.3
            + stability.prediction_stability * 0.2;
        if urgent {
            score += stability.complexity * 0.1;
        }
        score
    }

    pub fn confidence(&self) -> f64 {
        clamp_unit(stats::mean(&[
            self.goodness_of_fit,
            self.stability_metrics.parameter_stability,
            self.stability_metrics.prediction_stability,
            1.0 - self.bias_variance.total_error,
        ]))
    }
}

pub fn assess_model_fit(
    spec: &ModelSpec,
    data: &PredictionData,
    characteristics: &DataCharacteristics,
) -> ModelFitAssessment {
    let goodness_of_fit = goodness_of_fit(spec, characteristics.data_size);
    let residual_analysis = residual_analysis(&data.values());
    let stability_metrics = stability_metrics(spec, &data.values(), characteristics);
    let bias_variance = bias_variance(spec, characteristics);
    let recommendations =
        recommendations(spec, characteristics, goodness_of_fit, &residual_analysis);
    ModelFitAssessment {
        model_id: spec.id.clone(),
        goodness_of_fit,
        residual_analysis,
        stability_metrics,
        bias_variance,
        recommendations,
    }
}

/// Mean of the size/capacity match and the registry's expected accuracy
pub fn goodness_of_fit(spec: &ModelSpec, data_size: usize) -> f64 {
    let size = data_size as f64;
    let capacity = spec.capacity();
    let larger = size.max(capacity);
    let complexity_match = if larger <= 0.0 {
        1.0
    } else {
        1.0 - (size - capacity).abs() / larger
    };
    (complexity_match + spec.expected_accuracy) / 2.0
}

pub fn bias_variance(spec: &ModelSpec, characteristics: &DataCharacteristics) -> BiasVarianceTradeoff {
    let capacity = spec.capacity();
    let noise = characteristics.noise_level;
    let size = characteristics.data_size.max(1) as f64;
    let bias = (1.0 - capacity / COMPLEXITY_SCALE).max(0.1);
    let variance = noise + (capacity / size) * 0.1;
    BiasVarianceTradeoff {
        bias,
        variance,
        irreducible_error: noise,
        total_error: bias + variance + noise,
    }
}

pub fn stability_metrics(
    spec: &ModelSpec,
    values: &[f64],
    characteristics: &DataCharacteristics,
) -> StabilityMetrics {
    let noise = characteristics.noise_level.min(1.0);
    let prediction_stability = clamp_unit(1.0 - noise * 0.5 - characteristics.outlier_rate);

    // Level shift between halves relative to the overall spread
    let temporal_stability = if values.len() < 4 {
        1.0
    } else {
        let mid = values.len() / 2;
        let shift = (stats::mean(&values[mid..]) - stats::mean(&values[..mid])).abs();
        let spread = stats::std_dev(values);
        if spread < f64::EPSILON {
            1.0
        } else {
            1.0 / (1.0 + shift / spread)
        }
    };

    StabilityMetrics {
        parameter_stability: spec.stability,
        prediction_stability,
        temporal_stability,
        noise_sensitivity: noise,
        complexity: spec.complexity,
    }
}

/// Residuals of a least-squares line through the series
pub fn residual_analysis(values: &[f64]) -> ResidualAnalysis {
    if values.len() < 3 {
        return ResidualAnalysis::default();
    }
    let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let (slope, intercept) = stats::linear_fit(&index, values);
    let residuals: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, v)| v - (slope * i as f64 + intercept))
        .collect();

    let mid = residuals.len() / 2;
    let early = stats::variance(&residuals[..mid]);
    let late = stats::variance(&residuals[mid..]);
    let heteroscedasticity = if early.min(late) < f64::EPSILON {
        early.max(late) > f64::EPSILON
    } else {
        let ratio = late / early;
        ratio > HETEROSCEDASTIC_RATIO || ratio < 1.0 / HETEROSCEDASTIC_RATIO
    };

    ResidualAnalysis {
        mean_error: stats::mean(&residuals),
        std_error: stats::std_dev(&residuals),
        skewness: stats::skewness(&residuals),
        kurtosis: stats::kurtosis(&residuals),
        autocorrelation: stats::autocorrelation(&residuals, 1),
        heteroscedasticity,
    }
}

fn recommendations(
    spec: &ModelSpec,
    characteristics: &DataCharacteristics,
    goodness_of_fit: f64,
    residuals: &ResidualAnalysis,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if goodness_of_fit < 0.6 {
        recommendations.push("Consider adding more data or engineering features".to_string());
    }
    if spec.complexity > 0.8 {
        recommendations.push("Model is complex; watch for overfitting".to_string());
    }
    if characteristics.data_type != DataType::Timeseries && characteristics.feature_count < 5 {
        recommendations.push("Add more features to improve model performance".to_string());
    }
    if characteristics.data_size < spec.min_data_points * 2 {
        recommendations.push(format!(
            "Collect at least {} points for a stable fit",
            spec.min_data_points * 2
        ));
    }
    if residuals.autocorrelation > 0.5 {
        recommendations
            .push("Residuals are autocorrelated; prefer a seasonal or trend-aware model".to_string());
    }
    if residuals.heteroscedasticity {
        recommendations.push("Residual variance changes over time; consider a log transform".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::characteristics::analyze_data_characteristics;
    use crate::selector::registry::ModelRegistry;

    #[test]
    fn test_bias_variance_formula() {
        let registry = ModelRegistry::default();
        let spec = registry.get("exponential_smoothing").unwrap();
        let values: Vec<f64> = (0..100).map(|i| (i % 7) as f64).collect();
        let characteristics = analyze_data_characteristics(&PredictionData::from_values(&values));
        let tradeoff = bias_variance(spec, &characteristics);
        assert!((tradeoff.bias - 0.7).abs() < 1e-9);
        let expected_variance = characteristics.noise_level + (300.0 / 100.0) * 0.1;
        assert!((tradeoff.variance - expected_variance).abs() < 1e-9);
    }

    #[test]
    fn test_bias_floor() {
        let registry = ModelRegistry::default();
        let mut spec = registry.get("holt_winters").unwrap().clone();
        spec.complexity = 1.0;
        let characteristics = analyze_data_characteristics(&PredictionData::from_values(&[1.0; 50]));
        assert_eq!(bias_variance(&spec, &characteristics).bias, 0.1);
    }

    #[test]
    fn test_goodness_of_fit_peaks_at_capacity() {
        let registry = ModelRegistry::default();
        let spec = registry.get("exponential_smoothing").unwrap();
        // Capacity is 300 points
        assert!((goodness_of_fit(spec, 300) - 0.9).abs() < 1e-9);
        assert!(goodness_of_fit(spec, 300) > goodness_of_fit(spec, 150));
        assert!(goodness_of_fit(spec, 300) > goodness_of_fit(spec, 600));
    }

    #[test]
    fn test_linear_series_has_flat_residuals() {
        let values: Vec<f64> = (0..20).map(|i| 3.0 * i as f64 - 4.0).collect();
        let analysis = residual_analysis(&values);
        assert!(analysis.mean_error.abs() < 1e-9);
        assert!(analysis.std_error < 1e-9);
        assert!(!analysis.heteroscedasticity);
    }

    #[test]
    fn test_growing_noise_is_heteroscedastic() {
        let values: Vec<f64> = (0..40)
            .map(|i| {
                let amplitude = if i < 20 { 1.0 } else { 10.0 };
                if i % 2 == 0 { amplitude } else { -amplitude }
            })
            .collect();
        assert!(residual_analysis(&values).heteroscedasticity);
    }

    #[test]
    fn test_urgent_bonus() {
        let registry = ModelRegistry::default();
        let spec = registry.get("statistical_zscore").unwrap();
        let data = PredictionData::from_values(&[1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0]);
        let characteristics = analyze_data_characteristics(&data);
        let assessment = assess_model_fit(spec, &data, &characteristics);
        let bonus = assessment.selection_score(true) - assessment.selection_score(false);
        assert!((bonus - 0.04).abs() < 1e-9);
        assert!(assessment.confidence() >= 0.0 && assessment.confidence() <= 1.0);
    }
}
