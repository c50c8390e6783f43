//! Ensemble of predictor instances combined by a configurable strategy

use super::strategy::{
    combine_outputs, default_meta_learner, normalize_weights, EnsembleStrategy, MetaLearner,
};
use crate::error::{PredictionError, Result};
use crate::models::{
    clamp_unit, ConfidenceInterval, MetricsMap, PredictionData, PredictionResult, TrainingResult,
};
use crate::observability::EnsembleMetrics;
use crate::predictor::{regression_metrics, ModelInstance, Predictor};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Share of the series held out to fit a stacking meta-learner
const BACKTEST_FRACTION: f64 = 0.2;

/// Minimum relative half-width of the ensemble interval
const MIN_INTERVAL_FRACTION: f64 = 0.05;

/// One member's contribution to a single prediction
#[derive(Debug, Clone)]
struct MemberOutput {
    values: Vec<f64>,
    confidence: f64,
}

/// Per-member metrics from a walk-forward evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEvaluation {
    pub model_id: String,
    pub metrics: MetricsMap,
    /// Mean time per one-step prediction
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleEvaluation {
    pub metrics: MetricsMap,
    pub members: Vec<MemberEvaluation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleEngine {
    model_id: String,
    strategy: EnsembleStrategy,
    members: Vec<ModelInstance>,
    /// Parallel to `members`
    weights: Vec<f64>,
    history: Vec<TrainingResult>,
    #[serde(skip, default = "default_meta_learner")]
    meta_learner: Box<dyn MetaLearner>,
}

impl EnsembleEngine {
    pub fn new(model_id: impl Into<String>, strategy: EnsembleStrategy) -> Self {
        Self {
            model_id: model_id.into(),
            strategy,
            members: Vec::new(),
            weights: Vec::new(),
            history: Vec::new(),
            meta_learner: default_meta_learner(),
        }
    }

    pub fn with_meta_learner(mut self, learner: Box<dyn MetaLearner>) -> Self {
        self.meta_learner = learner;
        self
    }

    pub fn add_member(&mut self, member: impl Into<ModelInstance>, weight: f64) {
        self.members.push(member.into());
        self.weights.push(weight);
    }

    pub fn members(&self) -> &[ModelInstance] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.model_id().to_string()).collect()
    }

    pub fn strategy(&self) -> EnsembleStrategy {
        self.strategy
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Replace the raw weights; the length must match the member count
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        if weights.len() != self.members.len() {
            return Err(PredictionError::InvalidInput(format!(
                "expected {} weights, got {}",
                self.members.len(),
                weights.len()
            )));
        }
        self.weights = weights;
        Ok(())
    }

    pub fn meta_learner(&self) -> &dyn MetaLearner {
        self.meta_learner.as_ref()
    }

    /// Effective per-member weights for the configured strategy
    pub fn combination_weights(&self) -> Vec<f64> {
        let n = self.members.len();
        match self.strategy {
            EnsembleStrategy::Averaging | EnsembleStrategy::Voting => {
                normalize_weights(&vec![1.0; n])
            }
            EnsembleStrategy::Weighted => normalize_weights(&self.weights),
            EnsembleStrategy::Stacking => normalize_weights(
                &self
                    .meta_learner
                    .mixing_weights(&normalize_weights(&self.weights)),
            ),
        }
    }

    fn methodology(&self) -> String {
        format!("ensemble_{}", self.strategy.as_str())
    }

    /// Predict with one member; failures contribute zeros and confidence 0
    fn member_output(&self, member: &ModelInstance, data: &PredictionData, horizon: usize) -> MemberOutput {
        match member.predict(data, horizon) {
            Ok(result) => {
                let mut values = result.values();
                values.resize(horizon, 0.0);
                MemberOutput {
                    values,
                    confidence: result.confidence,
                }
            }
            Err(e) => {
                warn!(
                    ensemble = %self.model_id,
                    member = %member.model_id(),
                    error = %e,
                    "Member prediction failed, contributing zeros"
                );
                EnsembleMetrics::new().inc_member_failures();
                MemberOutput {
                    values: vec![0.0; horizon],
                    confidence: 0.0,
                }
            }
        }
    }

    /// Train every member concurrently on the blocking pool
    ///
    /// Individual failures, including panics, are tolerated; the run only
    /// fails when no member trains.
    pub async fn train_concurrent(&mut self, data: Arc<PredictionData>) -> Result<TrainingResult> {
        if self.members.is_empty() {
            return Err(PredictionError::NoPredictors);
        }
        let start = Instant::now();
        let mut set = JoinSet::new();
        for (idx, member) in self.members.iter().cloned().enumerate() {
            let data = Arc::clone(&data);
            set.spawn_blocking(move || {
                let mut member = member;
                let result = member.train(&data);
                (idx, member, result)
            });
        }

        let mut outcomes: Vec<Option<Result<TrainingResult>>> =
            (0..self.members.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, member, result)) => {
                    if result.is_ok() {
                        self.members[idx] = member;
                    }
                    outcomes[idx] = Some(result);
                }
                Err(e) => {
                    warn!(ensemble = %self.model_id, error = %e, "Member training task failed");
                }
            }
        }
        self.finish_training(&data, outcomes, start)
    }

    fn finish_training(
        &mut self,
        data: &PredictionData,
        outcomes: Vec<Option<Result<TrainingResult>>>,
        start: Instant,
    ) -> Result<TrainingResult> {
        let metrics_handle = EnsembleMetrics::new();
        let mut first_error = None;
        let mut succeeded: Vec<(usize, TrainingResult)> = Vec::new();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(result)) => succeeded.push((idx, result)),
                Some(Err(e)) => {
                    warn!(
                        ensemble = %self.model_id,
                        member = %self.members[idx].model_id(),
                        error = %e,
                        "Member training failed"
                    );
                    metrics_handle.inc_member_failures();
                    first_error.get_or_insert(e);
                }
                None => metrics_handle.inc_member_failures(),
            }
        }

        if succeeded.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                PredictionError::InvalidInput("every ensemble member failed to train".to_string())
            }));
        }

        if self.strategy == EnsembleStrategy::Weighted {
            let mut weights = vec![0.0; self.members.len()];
            for (idx, result) in &succeeded {
                weights[*idx] = result.training_score.max(0.0);
            }
            self.weights = normalize_weights(&weights);
        }
        if self.strategy == EnsembleStrategy::Stacking {
            self.fit_meta_learner(data);
        }

        let results: Vec<&TrainingResult> = succeeded.iter().map(|(_, r)| r).collect();
        let scores: Vec<f64> = results.iter().map(|r| r.training_score).collect();
        let training_score = stats::mean(&scores);
        let validation_score =
            stats::mean(&results.iter().map(|r| r.validation_score).collect::<Vec<_>>());

        let mut metrics = MetricsMap::new();
        metrics.insert("base_model_count".to_string(), self.members.len() as f64);
        metrics.insert("trained_members".to_string(), succeeded.len() as f64);
        metrics.insert(
            "failed_members".to_string(),
            (self.members.len() - succeeded.len()) as f64,
        );
        metrics.insert(
            "avg_training_time_ms".to_string(),
            stats::mean(&results.iter().map(|r| r.training_time_ms as f64).collect::<Vec<_>>()),
        );
        metrics.insert(
            "best_member_score".to_string(),
            scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        );
        metrics.insert(
            "worst_member_score".to_string(),
            scores.iter().copied().fold(f64::INFINITY, f64::min),
        );

        let elapsed = start.elapsed();
        metrics_handle.observe_training_latency(elapsed.as_secs_f64());
        info!(
            ensemble = %self.model_id,
            strategy = self.strategy.as_str(),
            trained = succeeded.len(),
            total = self.members.len(),
            training_score = training_score,
            "Ensemble trained"
        );

        let result = TrainingResult {
            model_id: self.model_id.clone(),
            algorithm: self.methodology(),
            training_score,
            validation_score,
            training_time_ms: elapsed.as_millis() as u64,
            feature_importance: average_importance(&results),
            metrics,
            trained_at: chrono::Utc::now().timestamp_millis(),
        };
        self.history.push(result.clone());
        Ok(result)
    }

    /// Fit the meta-learner on one-step backtests over the tail of `data`
    fn fit_meta_learner(&mut self, data: &PredictionData) {
        let n = data.len();
        if n < 2 {
            return;
        }
        let holdout = ((n as f64 * BACKTEST_FRACTION).ceil() as usize).clamp(1, n - 1);
        let start = n - holdout;
        let actuals: Vec<f64> = data.values()[start..].to_vec();
        let member_predictions: Vec<Vec<f64>> = self
            .members
            .iter()
            .map(|m| {
                (start..n)
                    .map(|i| {
                        let (history, _) = data.split_at(i);
                        m.predict(&history, 1)
                            .ok()
                            .and_then(|r| r.prediction.first())
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();
        self.meta_learner.fit(&member_predictions, &actuals);
        debug!(
            ensemble = %self.model_id,
            learner = self.meta_learner.name(),
            backtest_points = actuals.len(),
            "Fitted stacking meta-learner"
        );
    }

    /// Walk-forward evaluation of the ensemble and each member
    pub fn evaluate_detailed(&self, test_data: &PredictionData) -> Result<EnsembleEvaluation> {
        if self.members.is_empty() {
            return Err(PredictionError::NoPredictors);
        }
        if !self.is_trained() {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        if test_data.len() < 2 {
            return Err(PredictionError::insufficient_data(&self.model_id, 2, test_data.len()));
        }

        let weights = self.combination_weights();
        let steps = test_data.len() - 1;
        let actuals: Vec<f64> = test_data.values()[1..].to_vec();
        let mut member_preds = vec![Vec::with_capacity(steps); self.members.len()];
        let mut member_elapsed = vec![0.0; self.members.len()];
        let mut combined = Vec::with_capacity(steps);
        let mut confidences = Vec::with_capacity(steps);
        let mut spreads = Vec::with_capacity(steps);

        for i in 1..test_data.len() {
            let (history, _) = test_data.split_at(i);
            let outputs: Vec<MemberOutput> = self
                .members
                .iter()
                .enumerate()
                .map(|(m, member)| {
                    let started = Instant::now();
                    let out = self.member_output(member, &history, 1);
                    member_elapsed[m] += started.elapsed().as_secs_f64() * 1000.0;
                    out
                })
                .collect();
            let firsts: Vec<f64> = outputs.iter().map(|o| o.values[0]).collect();
            for (m, v) in firsts.iter().enumerate() {
                member_preds[m].push(*v);
            }
            combined.push(firsts.iter().zip(&weights).map(|(v, w)| v * w).sum::<f64>());
            confidences.push(clamp_unit(
                outputs.iter().zip(&weights).map(|(o, w)| o.confidence * w).sum(),
            ));
            spreads.push(mean_pairwise_spread(&firsts));
        }

        let mut metrics = regression_metrics(&combined, &actuals);
        let members: Vec<MemberEvaluation> = self
            .members
            .iter()
            .enumerate()
            .map(|(m, member)| MemberEvaluation {
                model_id: member.model_id().to_string(),
                metrics: regression_metrics(&member_preds[m], &actuals),
                latency_ms: member_elapsed[m] / steps as f64,
            })
            .collect();

        let mean_member_r2 =
            stats::mean(&members.iter().map(|m| m.metrics["r2"]).collect::<Vec<_>>());
        let scale = stats::mean(&actuals.iter().map(|a| a.abs()).collect::<Vec<_>>());
        let diversity = if scale < f64::EPSILON {
            0.0
        } else {
            (stats::mean(&spreads) / scale).min(1.0)
        };
        metrics.insert(
            "ensemble_gain".to_string(),
            (metrics["r2"] - mean_member_r2).max(0.0),
        );
        metrics.insert("diversity".to_string(), diversity);
        metrics.insert(
            "stability".to_string(),
            clamp_unit(1.0 - stats::coefficient_of_variation(&confidences)),
        );
        Ok(EnsembleEvaluation { metrics, members })
    }
}

/// Mean absolute difference over all member pairs
fn mean_pairwise_spread(values: &[f64]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..values.len() {
        for j in i + 1..values.len() {
            total += (values[i] - values[j]).abs();
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

/// Average importance over the members that report any
fn average_importance(results: &[&TrainingResult]) -> BTreeMap<String, f64> {
    let reporting: Vec<_> = results
        .iter()
        .filter(|r| !r.feature_importance.is_empty())
        .collect();
    let mut importance = BTreeMap::new();
    for r in &reporting {
        for (feature, value) in &r.feature_importance {
            *importance.entry(feature.clone()).or_insert(0.0) += value;
        }
    }
    for value in importance.values_mut() {
        *value /= reporting.len() as f64;
    }
    importance
}

impl Predictor for EnsembleEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn algorithm(&self) -> &'static str {
        "ensemble"
    }

    /// The smallest member minimum: one trained member is enough
    fn min_data_points(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.min_data_points())
            .min()
            .unwrap_or(0)
    }

    fn is_trained(&self) -> bool {
        self.members.iter().any(|m| m.is_trained())
    }

    fn training_history(&self) -> &[TrainingResult] {
        &self.history
    }

    /// Sequential training, same aggregation as [`EnsembleEngine::train_concurrent`]
    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult> {
        if self.members.is_empty() {
            return Err(PredictionError::NoPredictors);
        }
        let start = Instant::now();
        let outcomes = self
            .members
            .iter_mut()
            .map(|m| Some(m.train(data)))
            .collect();
        self.finish_training(data, outcomes, start)
    }

    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult> {
        if self.members.is_empty() {
            return Err(PredictionError::NoPredictors);
        }
        if !self.is_trained() {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        if horizon == 0 {
            return Err(PredictionError::InvalidInput(
                "horizon must be at least 1".to_string(),
            ));
        }
        let start = Instant::now();
        let outputs: Vec<MemberOutput> = self
            .members
            .iter()
            .map(|m| self.member_output(m, data, horizon))
            .collect();
        let weights = self.combination_weights();
        let values: Vec<Vec<f64>> = outputs.iter().map(|o| o.values.clone()).collect();
        let combined = combine_outputs(&values, &weights);
        let confidence = clamp_unit(
            outputs
                .iter()
                .zip(&weights)
                .map(|(o, w)| o.confidence * w)
                .sum(),
        );

        // Weighted spread of member outputs around the combined value
        let (lower, upper): (Vec<f64>, Vec<f64>) = combined
            .iter()
            .enumerate()
            .map(|(step, c)| {
                let var: f64 = values
                    .iter()
                    .zip(&weights)
                    .map(|(v, w)| w * (v[step] - c).powi(2))
                    .sum();
                let half = (1.96 * var.sqrt()).max(MIN_INTERVAL_FRACTION * c.abs());
                (c - half, c + half)
            })
            .unzip();

        EnsembleMetrics::new().observe_prediction_latency(start.elapsed().as_secs_f64());
        Ok(PredictionResult::new(
            &self.model_id,
            self.methodology(),
            combined,
            confidence,
            Some(ConfidenceInterval { lower, upper }),
        ))
    }

    fn evaluate(&self, test_data: &PredictionData) -> Result<MetricsMap> {
        Ok(self.evaluate_detailed(test_data)?.metrics)
    }
}
