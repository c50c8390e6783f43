//! Data profiling used to pick and score candidate models

use crate::models::{DataType, PredictionData};
use crate::predictor::{detect_seasonality, Seasonality};
use crate::stats;
use serde::{Deserialize, Serialize};

/// Trend detection needs at least this many points
const MIN_TREND_POINTS: usize = 10;
/// Linear fit r² above which a trend is reported
const TREND_R2_THRESHOLD: f64 = 0.3;
/// Outliers sit beyond this many standard deviations
const OUTLIER_SIGMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendInfo {
    pub direction: TrendDirection,
    /// r² of the linear fit against the index
    pub strength: f64,
    pub slope: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCharacteristics {
    pub data_type: DataType,
    pub data_size: usize,
    pub feature_count: usize,
    pub target_variance: f64,
    pub target_range: f64,
    pub missing_value_rate: f64,
    pub is_time_series: bool,
    /// Present for time series only
    pub seasonality: Option<Seasonality>,
    pub trend: Option<TrendInfo>,
    /// Variance of first differences over variance of values
    pub noise_level: f64,
    /// |correlation| between the first declared feature and the target
    pub linearity: f64,
    /// Share of values beyond 2σ from the mean
    pub outlier_rate: f64,
}

impl DataCharacteristics {
    pub fn has_seasonality(&self) -> bool {
        self.seasonality.map(|s| s.detected).unwrap_or(false)
    }

    pub fn has_trend(&self) -> bool {
        self.trend.is_some()
    }
}

pub fn analyze_data_characteristics(data: &PredictionData) -> DataCharacteristics {
    let values = data.values();
    let is_time_series = data.data_type == DataType::Timeseries;
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));

    DataCharacteristics {
        data_type: data.data_type,
        data_size: values.len(),
        feature_count: data.features.len(),
        target_variance: stats::variance(&values),
        target_range: if values.is_empty() { 0.0 } else { max - min },
        missing_value_rate: missing_value_rate(data),
        is_time_series,
        seasonality: is_time_series.then(|| detect_seasonality(&values)),
        trend: if is_time_series { detect_trend(&values) } else { None },
        noise_level: noise_level(&values),
        linearity: linearity(data),
        outlier_rate: outlier_rate(&values),
    }
}

/// Missing or non-finite declared features over all value slots
pub fn missing_value_rate(data: &PredictionData) -> f64 {
    let slots = data.len() * (1 + data.features.len());
    if slots == 0 {
        return 0.0;
    }
    let missing: usize = data
        .points
        .iter()
        .map(|p| {
            let value_missing = usize::from(!p.value.is_finite());
            let features_missing = data
                .features
                .iter()
                .filter(|f| !p.feature(f).map(f64::is_finite).unwrap_or(false))
                .count();
            value_missing + features_missing
        })
        .sum();
    missing as f64 / slots as f64
}

pub fn detect_trend(values: &[f64]) -> Option<TrendInfo> {
    if values.len() < MIN_TREND_POINTS {
        return None;
    }
    let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let r2 = stats::pearson(&index, values).powi(2);
    if r2 <= TREND_R2_THRESHOLD {
        return None;
    }
    let slope = stats::linear_regression_slope(values);
    Some(TrendInfo {
        direction: if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        },
        strength: r2,
        slope,
    })
}

/// Fewer than two points count as pure noise
pub fn noise_level(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 1.0;
    }
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let signal = stats::variance(values);
    if signal < f64::EPSILON {
        0.0
    } else {
        stats::variance(&diffs) / signal
    }
}

/// Absent feature values count as 0
pub fn linearity(data: &PredictionData) -> f64 {
    let Some(first) = data.features.first() else {
        return 0.0;
    };
    let xs: Vec<f64> = data
        .points
        .iter()
        .map(|p| p.feature(first).unwrap_or(0.0))
        .collect();
    stats::pearson(&xs, &data.values()).abs()
}

pub fn outlier_rate(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = stats::mean(values);
    let limit = stats::std_dev(values) * OUTLIER_SIGMA;
    let outliers = values.iter().filter(|v| (*v - mean).abs() > limit).count();
    outliers as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PredictionDataPoint;
    use std::collections::HashMap;

    #[test]
    fn test_trending_series() {
        let values: Vec<f64> = (0..40).map(|i| 2.0 * i as f64 + 5.0).collect();
        let characteristics = analyze_data_characteristics(&PredictionData::from_values(&values));
        let trend = characteristics.trend.unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!(characteristics.is_time_series);
        assert_eq!(characteristics.target_range, 78.0);
        // Differences are constant
        assert_eq!(characteristics.noise_level, 0.0);
    }

    #[test]
    fn test_seasonal_series() {
        let values: Vec<f64> = (0..120)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 30.0).sin())
            .collect();
        let characteristics = analyze_data_characteristics(&PredictionData::from_values(&values));
        assert!(characteristics.has_seasonality());
        assert_eq!(characteristics.seasonality.unwrap().period, 30);
    }

    #[test]
    fn test_outlier_rate() {
        let mut values = vec![10.0; 19];
        values.push(100.0);
        assert!((outlier_rate(&values) - 0.05).abs() < 1e-9);
        assert_eq!(outlier_rate(&[]), 0.0);
    }

    #[test]
    fn test_missing_features_and_linearity() {
        let points: Vec<PredictionDataPoint> = (0..4)
            .map(|i| {
                let mut features = HashMap::new();
                if i != 3 {
                    features.insert("x".to_string(), i as f64);
                }
                PredictionDataPoint::new(i, 3.0 * i as f64).with_features(features)
            })
            .collect();
        let data = PredictionData::new(points, DataType::Tabular).with_features(vec!["x".to_string()]);
        // One of eight slots is missing
        assert!((missing_value_rate(&data) - 0.125).abs() < 1e-9);
        let characteristics = analyze_data_characteristics(&data);
        assert!(characteristics.seasonality.is_none());
        assert!(characteristics.linearity > 0.0 && characteristics.linearity < 1.0);
    }

    #[test]
    fn test_short_series_is_noise() {
        assert_eq!(noise_level(&[1.0]), 1.0);
        assert!(detect_trend(&[1.0, 2.0, 3.0]).is_none());
    }
}
