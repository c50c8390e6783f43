//! Ensemble that reweights its members from recent performance and drift

use super::drift::{DriftDetection, DriftDetector, DriftSeverity, DEFAULT_DRIFT_WINDOW};
use super::engine::{EnsembleEngine, EnsembleEvaluation};
use super::strategy::{normalize_weights, EnsembleStrategy};
use crate::error::Result;
use crate::models::{MetricsMap, PredictionData, PredictionResult, TrainingResult};
use crate::predictor::{ModelInstance, Predictor};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_ADAPTATION_WINDOW: usize = 5;
const DEFAULT_ADAPTATION_THRESHOLD: f64 = 0.1;
const DEFAULT_PERFORMANCE_HISTORY: usize = 500;

/// Latency at or above this scores zero
const LATENCY_CEILING_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Most recent records considered per member
    pub window: usize,
    /// Mean absolute weight change that counts as significant
    pub threshold: f64,
    /// Performance records retained by the ensemble
    pub history_limit: usize,
    pub drift_window: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ADAPTATION_WINDOW,
            threshold: DEFAULT_ADAPTATION_THRESHOLD,
            history_limit: DEFAULT_PERFORMANCE_HISTORY,
            drift_window: DEFAULT_DRIFT_WINDOW,
        }
    }
}

/// One observation of a member's quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub member: String,
    pub accuracy: f64,
    pub error_rate: f64,
    pub latency_ms: f64,
    pub recorded_at: i64,
}

impl PerformanceRecord {
    pub fn new(member: impl Into<String>, accuracy: f64, error_rate: f64, latency_ms: f64) -> Self {
        Self {
            member: member.into(),
            accuracy,
            error_rate,
            latency_ms,
            recorded_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// `0.5·accuracy + 0.3·(1 − error) + 0.2·latency score`
    pub fn score(&self) -> f64 {
        let latency_score = 1.0 - (self.latency_ms.max(0.0) / LATENCY_CEILING_MS).min(1.0);
        self.accuracy * 0.5 + (1.0 - self.error_rate) * 0.3 + latency_score * 0.2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub weights: Vec<f64>,
    pub previous_weights: Vec<f64>,
    /// Mean absolute per-member change
    pub weight_change: f64,
    pub adaptation_reason: String,
    /// Recent-half minus older-half mean accuracy
    pub performance_gain: f64,
    pub drift_severity: DriftSeverity,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveEnsemble {
    engine: EnsembleEngine,
    drift_detector: DriftDetector,
    config: AdaptationConfig,
    performance: VecDeque<PerformanceRecord>,
}

impl AdaptiveEnsemble {
    pub fn new(model_id: impl Into<String>, strategy: EnsembleStrategy) -> Self {
        Self::with_config(model_id, strategy, AdaptationConfig::default())
    }

    pub fn with_config(
        model_id: impl Into<String>,
        strategy: EnsembleStrategy,
        config: AdaptationConfig,
    ) -> Self {
        Self {
            engine: EnsembleEngine::new(model_id, strategy),
            drift_detector: DriftDetector::new(config.drift_window),
            config,
            performance: VecDeque::new(),
        }
    }

    pub fn engine(&self) -> &EnsembleEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut EnsembleEngine {
        &mut self.engine
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    pub fn add_member(&mut self, member: impl Into<ModelInstance>, weight: f64) {
        self.engine.add_member(member, weight);
    }

    pub fn weights(&self) -> &[f64] {
        self.engine.weights()
    }

    pub fn performance_history(&self) -> &VecDeque<PerformanceRecord> {
        &self.performance
    }

    pub fn record_performance(&mut self, record: PerformanceRecord) {
        self.performance.push_back(record);
        while self.performance.len() > self.config.history_limit {
            self.performance.pop_front();
        }
    }

    pub fn detect_concept_drift(&mut self, data: &PredictionData) -> DriftDetection {
        self.drift_detector.detect(data)
    }

    pub fn drift_detector(&self) -> &DriftDetector {
        &self.drift_detector
    }

    /// Walk-forward evaluation that also records one performance entry per member
    pub fn evaluate_members(&mut self, test_data: &PredictionData) -> Result<EnsembleEvaluation> {
        let evaluation = self.engine.evaluate_detailed(test_data)?;
        for member in &evaluation.members {
            let accuracy = member.metrics.get("accuracy").copied().unwrap_or(0.0);
            let mape = member.metrics.get("mape").copied().unwrap_or(100.0);
            self.record_performance(PerformanceRecord::new(
                member.model_id.clone(),
                accuracy,
                (mape / 100.0).clamp(0.0, 1.0),
                member.latency_ms,
            ));
        }
        Ok(evaluation)
    }

    /// Reweight from the ensemble's own recorded performance
    pub fn adapt_from_recorded(&mut self, drift: DriftSeverity) -> WeightUpdate {
        let history: Vec<PerformanceRecord> = self.performance.iter().cloned().collect();
        self.adapt_ensemble_weights(&history, drift)
    }

    /// Recompute member weights from each member's recent records
    ///
    /// Members without records get the mean score of those with records;
    /// with no usable records at all the weights become uniform.
    pub fn adapt_ensemble_weights(
        &mut self,
        history: &[PerformanceRecord],
        drift: DriftSeverity,
    ) -> WeightUpdate {
        let member_ids = self.engine.member_ids();
        let previous_weights = normalize_weights(self.engine.weights());

        // Keep each member's last `window` records, in history order
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut keep = vec![false; history.len()];
        for (idx, record) in history.iter().enumerate().rev() {
            let count = seen.entry(record.member.as_str()).or_insert(0);
            if *count < self.config.window && member_ids.contains(&record.member) {
                *count += 1;
                keep[idx] = true;
            }
        }
        let recent: Vec<&PerformanceRecord> = history
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(r, _)| r)
            .collect();

        let member_scores: Vec<Option<f64>> = member_ids
            .iter()
            .map(|id| {
                let scores: Vec<f64> = recent
                    .iter()
                    .filter(|r| &r.member == id)
                    .map(|r| r.score())
                    .collect();
                (!scores.is_empty()).then(|| stats::mean(&scores))
            })
            .collect();
        let known: Vec<f64> = member_scores.iter().flatten().copied().collect();
        let fill = stats::mean(&known);
        let penalized: Vec<f64> = member_scores
            .iter()
            .map(|s| s.unwrap_or(fill) * drift.penalty())
            .collect();
        let weights = normalize_weights(&penalized);

        let weight_change = if weights.is_empty() {
            0.0
        } else if previous_weights.len() != weights.len() {
            1.0
        } else {
            previous_weights
                .iter()
                .zip(&weights)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / weights.len() as f64
        };
        let performance_gain = accuracy_gain(&recent);
        let adaptation_reason =
            adaptation_reason(weight_change, self.config.threshold, drift, performance_gain);

        if let Err(e) = self.engine.set_weights(weights.clone()) {
            warn!(ensemble = %self.engine.model_id(), error = %e, "Weight update rejected");
        }

        info!(
            ensemble = %self.engine.model_id(),
            weight_change = weight_change,
            drift = drift.as_str(),
            reason = %adaptation_reason,
            "Adapted ensemble weights"
        );
        debug!(weights = ?weights, previous = ?previous_weights, "Weight update detail");

        WeightUpdate {
            weights,
            previous_weights,
            weight_change,
            adaptation_reason,
            performance_gain,
            drift_severity: drift,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub async fn train_concurrent(&mut self, data: Arc<PredictionData>) -> Result<TrainingResult> {
        self.engine.train_concurrent(data).await
    }
}

fn accuracy_gain(recent: &[&PerformanceRecord]) -> f64 {
    if recent.len() < 2 {
        return 0.0;
    }
    let mid = recent.len() / 2;
    let older: Vec<f64> = recent[..mid].iter().map(|r| r.accuracy).collect();
    let newer: Vec<f64> = recent[mid..].iter().map(|r| r.accuracy).collect();
    stats::mean(&newer) - stats::mean(&older)
}

fn adaptation_reason(
    weight_change: f64,
    threshold: f64,
    drift: DriftSeverity,
    performance_gain: f64,
) -> String {
    let mut reasons = Vec::new();
    if weight_change > threshold {
        reasons.push(format!("significant weight change ({:.1}%)", weight_change * 100.0));
    }
    if drift != DriftSeverity::Low {
        reasons.push(format!("{} data drift detected", drift.as_str()));
    }
    if performance_gain > 0.0 {
        reasons.push(format!("performance gain {:.1}%", performance_gain * 100.0));
    } else if performance_gain < 0.0 {
        reasons.push(format!("performance drop {:.1}%", performance_gain.abs() * 100.0));
    }
    if reasons.is_empty() {
        "periodic adjustment".to_string()
    } else {
        reasons.join("; ")
    }
}

impl Predictor for AdaptiveEnsemble {
    fn model_id(&self) -> &str {
        self.engine.model_id()
    }

    fn algorithm(&self) -> &'static str {
        "adaptive_ensemble"
    }

    fn min_data_points(&self) -> usize {
        self.engine.min_data_points()
    }

    fn is_trained(&self) -> bool {
        self.engine.is_trained()
    }

    fn training_history(&self) -> &[TrainingResult] {
        self.engine.training_history()
    }

    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult> {
        self.engine.train(data)
    }

    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult> {
        self.engine.predict(data, horizon)
    }

    fn evaluate(&self, test_data: &PredictionData) -> Result<MetricsMap> {
        self.engine.evaluate(test_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::CausalInferenceEngine;

    fn create_test_ensemble() -> AdaptiveEnsemble {
        let mut ensemble = AdaptiveEnsemble::new("adaptive", EnsembleStrategy::Weighted);
        ensemble.add_member(CausalInferenceEngine::new("a"), 1.0);
        ensemble.add_member(CausalInferenceEngine::new("b"), 1.0);
        ensemble
    }

    #[test]
    fn test_score_formula() {
        let record = PerformanceRecord::new("a", 0.8, 0.1, 500.0);
        assert!((record.score() - (0.4 + 0.27 + 0.1)).abs() < 1e-9);
        let slow = PerformanceRecord::new("a", 0.8, 0.1, 5000.0);
        assert!((slow.score() - 0.67).abs() < 1e-9);
    }

    #[test]
    fn test_better_member_gains_weight() {
        let mut ensemble = create_test_ensemble();
        let history = vec![
            PerformanceRecord::new("a", 0.9, 0.1, 100.0),
            PerformanceRecord::new("b", 0.3, 0.6, 100.0),
        ];
        let update = ensemble.adapt_ensemble_weights(&history, DriftSeverity::Low);
        assert!(update.weights[0] > update.weights[1]);
        assert!((update.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(update.previous_weights, vec![0.5, 0.5]);
        assert_eq!(ensemble.weights(), update.weights.as_slice());
    }

    #[test]
    fn test_memberless_ensemble_adapts_to_nothing() {
        let mut ensemble = AdaptiveEnsemble::new("empty", EnsembleStrategy::Weighted);
        let history = vec![PerformanceRecord::new("ghost", 0.9, 0.1, 10.0)];
        let update = ensemble.adapt_ensemble_weights(&history, DriftSeverity::High);
        assert!(update.weights.is_empty());
        assert_eq!(update.weight_change, 0.0);
        assert!(ensemble.weights().is_empty());
    }

    #[test]
    fn test_missing_member_gets_mean_score() {
        let mut ensemble = create_test_ensemble();
        let history = vec![PerformanceRecord::new("a", 0.9, 0.1, 0.0)];
        let update = ensemble.adapt_ensemble_weights(&history, DriftSeverity::Medium);
        assert_eq!(update.weights, vec![0.5, 0.5]);
        assert!(update.adaptation_reason.contains("medium data drift"));
    }

    #[test]
    fn test_no_history_is_uniform_periodic() {
        let mut ensemble = create_test_ensemble();
        let update = ensemble.adapt_ensemble_weights(&[], DriftSeverity::Low);
        assert_eq!(update.weights, vec![0.5, 0.5]);
        assert_eq!(update.weight_change, 0.0);
        assert_eq!(update.adaptation_reason, "periodic adjustment");
    }

    #[test]
    fn test_only_recent_window_counts() {
        let mut ensemble = create_test_ensemble();
        let mut history: Vec<PerformanceRecord> = (0..10)
            .map(|_| PerformanceRecord::new("a", 0.0, 1.0, 1000.0))
            .collect();
        // Five fresh records replace every stale one
        history.extend((0..5).map(|_| PerformanceRecord::new("a", 1.0, 0.0, 0.0)));
        history.extend((0..5).map(|_| PerformanceRecord::new("b", 1.0, 0.0, 0.0)));
        let update = ensemble.adapt_ensemble_weights(&history, DriftSeverity::Low);
        assert_eq!(update.weights, vec![0.5, 0.5]);
        assert_eq!(update.performance_gain, 0.0);
    }

    #[test]
    fn test_reason_reports_change_and_drop() {
        let mut ensemble = create_test_ensemble();
        let history = vec![
            PerformanceRecord::new("a", 1.0, 0.0, 0.0),
            PerformanceRecord::new("b", 0.0, 1.0, 1000.0),
        ];
        let update = ensemble.adapt_ensemble_weights(&history, DriftSeverity::High);
        // a scores 1.0, b scores 0.0
        assert_eq!(update.weights, vec![1.0, 0.0]);
        assert!((update.weight_change - 0.5).abs() < 1e-9);
        assert!(update.adaptation_reason.contains("significant weight change (50.0%)"));
        assert!(update.adaptation_reason.contains("high data drift"));
        assert!(update.adaptation_reason.contains("performance drop 100.0%"));
    }

    #[test]
    fn test_evaluate_members_records_performance() {
        let mut ensemble = create_test_ensemble();
        let data = PredictionData::from_values(&[5.0; 10]);
        ensemble.train(&data).unwrap();
        ensemble.evaluate_members(&data).unwrap();
        assert_eq!(ensemble.performance_history().len(), 2);
        let record = &ensemble.performance_history()[0];
        assert_eq!(record.accuracy, 1.0);
        assert_eq!(record.error_rate, 0.0);

        // Scores differ only by measured latency
        let update = ensemble.adapt_from_recorded(DriftSeverity::Low);
        assert!((update.weights[0] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_drift_detector_is_owned() {
        let mut ensemble = create_test_ensemble();
        let first = ensemble.detect_concept_drift(&PredictionData::from_values(&[1.0, 2.0, 3.0]));
        assert!(!first.detected);
        assert!(ensemble.drift_detector().has_baseline());
    }
}
