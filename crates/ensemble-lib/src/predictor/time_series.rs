//! Exponential-smoothing time series forecaster
//!
//! A simplified Holt-Winters style model: seasonality is found by
//! autocorrelation at a fixed set of candidate periods, and forecasts are
//! chained one step at a time from the latest observation.

use super::Predictor;
use crate::error::{PredictionError, Result};
use crate::models::{ConfidenceInterval, MetricsMap, PredictionData, PredictionResult, TrainingResult};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Instant;
use tracing::debug;

/// Candidate seasonal periods, in observation steps
pub const SEASONAL_PERIODS: [usize; 5] = [7, 14, 30, 90, 365];

/// Mean autocorrelation above which a period counts as seasonal
pub const SEASONALITY_THRESHOLD: f64 = 0.3;

/// Base relative half-width of the first forecast step
const BASE_UNCERTAINTY: f64 = 0.1;

/// Per-step growth of the uncertainty band
const UNCERTAINTY_GROWTH: f64 = 1.05;

/// Share of the series used for fitting; the rest is held out
const TRAIN_FRACTION: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesParams {
    pub window_size: usize,
    /// Smoothing weight on the previous forecast
    pub alpha: f64,
    /// Smoothing weight for the trend estimate
    pub beta: f64,
    /// Weight of the seasonal component
    pub gamma: f64,
}

impl Default for TimeSeriesParams {
    fn default() -> Self {
        Self {
            window_size: 12,
            alpha: 0.3,
            beta: 0.1,
            gamma: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityType {
    None,
    Weekly,
    Monthly,
    Yearly,
}

impl SeasonalityType {
    pub fn from_period(period: usize) -> Self {
        match period {
            0 => Self::None,
            1..=7 => Self::Weekly,
            8..=30 => Self::Monthly,
            _ => Self::Yearly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub detected: bool,
    /// Best scoring period, 0 when no candidate correlated positively
    pub period: usize,
    pub strength: f64,
    pub seasonality_type: SeasonalityType,
}

impl Seasonality {
    pub fn none() -> Self {
        Self {
            detected: false,
            period: 0,
            strength: 0.0,
            seasonality_type: SeasonalityType::None,
        }
    }
}

/// Scan the candidate periods and keep the best autocorrelation
///
/// Ties keep the earlier (shorter) period.
pub fn detect_seasonality(values: &[f64]) -> Seasonality {
    let mut best_period = 0;
    let mut best_score = 0.0;
    for period in SEASONAL_PERIODS {
        let score = seasonal_correlation(values, period);
        if score > best_score {
            best_score = score;
            best_period = period;
        }
    }
    Seasonality {
        detected: best_score > SEASONALITY_THRESHOLD,
        period: best_period,
        strength: best_score,
        seasonality_type: SeasonalityType::from_period(best_period),
    }
}

/// Mean autocorrelation at `period` and its multiples
///
/// Lags run `period, 2*period, ...` while below `min(3*period, n - period)`.
/// Series shorter than two periods score 0.
pub fn seasonal_correlation(values: &[f64], period: usize) -> f64 {
    let n = values.len();
    if period == 0 || n < period * 2 {
        return 0.0;
    }
    let limit = (period * 3).min(n - period);
    let correlations: Vec<f64> = (1..)
        .map(|k| k * period)
        .take_while(|lag| *lag < limit)
        .map(|lag| stats::autocorrelation(values, lag))
        .collect();
    stats::mean(&correlations)
}

/// Half-window mean differences over a sliding window of `min(12, n/4)`
pub fn extract_trend(values: &[f64]) -> Vec<f64> {
    let window = 12.min(values.len() / 4);
    if window < 2 {
        return Vec::new();
    }
    let half = window / 2;
    (window..values.len())
        .map(|i| {
            let w = &values[i - window..i];
            stats::mean(&w[half..]) - stats::mean(&w[..half])
        })
        .collect()
}

/// One step of a probabilistic forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastStep {
    pub value: f64,
    pub probability: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticForecast {
    pub model_id: String,
    pub steps: Vec<ForecastStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesEngine {
    model_id: String,
    params: TimeSeriesParams,
    trained: bool,
    seasonality: Seasonality,
    /// Trend smoothed with `beta` over the half-window deltas
    trend: f64,
    validation_rmse: f64,
    /// Mean absolute level of the training series
    scale: f64,
    last_value: f64,
    history: Vec<TrainingResult>,
}

impl TimeSeriesEngine {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_params(model_id, TimeSeriesParams::default())
    }

    pub fn with_params(model_id: impl Into<String>, params: TimeSeriesParams) -> Self {
        Self {
            model_id: model_id.into(),
            params: TimeSeriesParams {
                window_size: params.window_size.max(1),
                ..params
            },
            trained: false,
            seasonality: Seasonality::none(),
            trend: 0.0,
            validation_rmse: 0.0,
            scale: 0.0,
            last_value: 0.0,
            history: Vec::new(),
        }
    }

    pub fn params(&self) -> &TimeSeriesParams {
        &self.params
    }

    pub fn seasonality(&self) -> &Seasonality {
        &self.seasonality
    }

    pub fn trend(&self) -> f64 {
        self.trend
    }

    fn seasonal_component(&self, step: usize) -> f64 {
        if !self.seasonality.detected || self.seasonality.period == 0 {
            return 0.0;
        }
        let period = self.seasonality.period;
        let phase = (step % period) as f64 / period as f64 * 2.0 * PI;
        phase.sin() * self.seasonality.strength
    }

    /// Recursive point forecasts starting from the latest observation
    fn point_forecast(&self, data: &PredictionData, horizon: usize) -> Vec<f64> {
        let mut last = data.points.last().map(|p| p.value).unwrap_or(self.last_value);
        (1..=horizon)
            .map(|step| {
                let next = last * (1.0 - self.params.alpha)
                    + self.seasonal_component(step) * self.params.gamma;
                last = next;
                next
            })
            .collect()
    }

    fn step_uncertainty(step: usize) -> f64 {
        BASE_UNCERTAINTY * UNCERTAINTY_GROWTH.powi(step as i32 - 1)
    }

    /// Confidence from held-out error relative to the series level,
    /// decaying with the horizon
    fn confidence(&self, horizon: usize) -> f64 {
        let base = if self.scale < f64::EPSILON {
            if self.validation_rmse < f64::EPSILON {
                0.99
            } else {
                0.05
            }
        } else {
            (1.0 - self.validation_rmse / self.scale).clamp(0.05, 0.99)
        };
        base / UNCERTAINTY_GROWTH.powi(horizon.saturating_sub(1) as i32)
    }

    fn check_ready(&self, horizon: usize) -> Result<()> {
        if !self.trained {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        if horizon == 0 {
            return Err(PredictionError::InvalidInput(
                "horizon must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Point forecast with a per-step probability and interval
    pub fn forecast_with_uncertainty(
        &self,
        data: &PredictionData,
        horizon: usize,
    ) -> Result<ProbabilisticForecast> {
        self.check_ready(horizon)?;
        let steps = self
            .point_forecast(data, horizon)
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let u = Self::step_uncertainty(i + 1);
                ForecastStep {
                    value,
                    probability: 1.0 - u,
                    lower: value - value.abs() * u,
                    upper: value + value.abs() * u,
                }
            })
            .collect();
        Ok(ProbabilisticForecast {
            model_id: self.model_id.clone(),
            steps,
        })
    }

    fn moving_average_predictions(&self, values: &[f64], range: std::ops::Range<usize>) -> Vec<f64> {
        let w = self.params.window_size;
        range.map(|i| stats::mean(&values[i - w..i])).collect()
    }
}

impl Predictor for TimeSeriesEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn algorithm(&self) -> &'static str {
        "exponential_smoothing"
    }

    fn min_data_points(&self) -> usize {
        self.params.window_size + 1
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn training_history(&self) -> &[TrainingResult] {
        &self.history
    }

    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult> {
        let start = Instant::now();
        let n = data.len();
        if n < self.min_data_points() {
            return Err(PredictionError::insufficient_data(
                &self.model_id,
                self.min_data_points(),
                n,
            ));
        }

        let values = data.values();
        let w = self.params.window_size;
        let seasonality = detect_seasonality(&values);
        let trend = extract_trend(&values)
            .iter()
            .fold(0.0, |acc, d| self.params.beta * d + (1.0 - self.params.beta) * acc);

        let split = ((n as f64 * TRAIN_FRACTION).floor() as usize).clamp(w + 1, n);
        let fitted = self.moving_average_predictions(&values, w..split);
        let fit_actuals = &values[w..split];
        let mae = stats::mae(&fitted, fit_actuals);
        let rmse = stats::rmse(&fitted, fit_actuals);

        let held_out = self.moving_average_predictions(&values, split..n);
        let validation_rmse = if held_out.is_empty() {
            rmse
        } else {
            stats::rmse(&held_out, &values[split..])
        };

        let mut metrics = MetricsMap::new();
        metrics.insert("mae".to_string(), mae);
        metrics.insert("rmse".to_string(), rmse);
        metrics.insert("mape".to_string(), stats::mape(&fitted, fit_actuals));
        metrics.insert("r2".to_string(), stats::r_squared(&fitted, fit_actuals));
        metrics.insert("validation_rmse".to_string(), validation_rmse);
        metrics.insert("window_size".to_string(), w as f64);
        metrics.insert("alpha".to_string(), self.params.alpha);
        metrics.insert("beta".to_string(), self.params.beta);
        metrics.insert("gamma".to_string(), self.params.gamma);
        metrics.insert("seasonality_period".to_string(), seasonality.period as f64);
        metrics.insert("seasonality_strength".to_string(), seasonality.strength);
        metrics.insert("trend".to_string(), trend);

        self.seasonality = seasonality;
        self.trend = trend;
        self.validation_rmse = validation_rmse;
        self.scale = stats::mean(&values.iter().map(|v| v.abs()).collect::<Vec<_>>());
        self.last_value = values[n - 1];
        self.trained = true;

        debug!(
            model_id = %self.model_id,
            samples = n,
            seasonal = seasonality.detected,
            period = seasonality.period,
            mae = mae,
            "Trained time series engine"
        );

        let result = TrainingResult {
            model_id: self.model_id.clone(),
            algorithm: self.algorithm().to_string(),
            training_score: 1.0 / (1.0 + mae),
            validation_score: 1.0 / (1.0 + validation_rmse),
            training_time_ms: start.elapsed().as_millis() as u64,
            feature_importance: Default::default(),
            metrics,
            trained_at: chrono::Utc::now().timestamp_millis(),
        };
        self.history.push(result.clone());
        Ok(result)
    }

    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult> {
        self.check_ready(horizon)?;
        let values = self.point_forecast(data, horizon);
        let (lower, upper): (Vec<f64>, Vec<f64>) = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let u = Self::step_uncertainty(i + 1);
                (v - v.abs() * u, v + v.abs() * u)
            })
            .unzip();
        let methodology = if self.seasonality.detected {
            "seasonal_exponential_smoothing"
        } else {
            "exponential_smoothing"
        };
        Ok(PredictionResult::new(
            &self.model_id,
            methodology,
            values,
            self.confidence(horizon),
            Some(ConfidenceInterval { lower, upper }),
        ))
    }
}
