//! Combination strategies and the stacking meta-learner seam

use crate::stats;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleStrategy {
    /// Unweighted mean per step
    Averaging,
    /// Normalized member weights
    #[default]
    Weighted,
    /// Numeric regression has no classes, so this is averaging
    Voting,
    /// Mixing weights come from a [`MetaLearner`]
    Stacking,
}

impl EnsembleStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Averaging => "averaging",
            Self::Weighted => "weighted",
            Self::Voting => "voting",
            Self::Stacking => "stacking",
        }
    }
}

/// Normalize to sum 1; negative entries count as 0 and an all-zero
/// vector becomes uniform
pub fn normalize_weights(weights: &[f64]) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let clipped: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .collect();
    let total: f64 = clipped.iter().sum();
    if total <= 0.0 {
        return vec![1.0 / weights.len() as f64; weights.len()];
    }
    clipped.iter().map(|w| w / total).collect()
}

/// Per-step weighted sum of member outputs
///
/// `outputs[i]` is member i's series; shorter series count as 0 past their end.
pub fn combine_outputs(outputs: &[Vec<f64>], weights: &[f64]) -> Vec<f64> {
    let horizon = outputs.iter().map(|o| o.len()).max().unwrap_or(0);
    (0..horizon)
        .map(|step| {
            outputs
                .iter()
                .zip(weights)
                .map(|(o, w)| o.get(step).copied().unwrap_or(0.0) * w)
                .sum()
        })
        .collect()
}

/// Learns how to mix member outputs for the stacking strategy
pub trait MetaLearner: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fit on backtest outputs: `member_predictions[i][t]` against `actuals[t]`
    fn fit(&mut self, member_predictions: &[Vec<f64>], actuals: &[f64]);

    /// Mixing weights given the ensemble's normalized base weights
    fn mixing_weights(&self, base: &[f64]) -> Vec<f64>;

    fn clone_box(&self) -> Box<dyn MetaLearner>;
}

impl Clone for Box<dyn MetaLearner> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Keeps the ensemble's own weights; stacking then equals weighted averaging
#[derive(Debug, Clone, Default)]
pub struct WeightedFallback;

impl MetaLearner for WeightedFallback {
    fn name(&self) -> &'static str {
        "weighted_fallback"
    }

    fn fit(&mut self, _member_predictions: &[Vec<f64>], _actuals: &[f64]) {}

    fn mixing_weights(&self, base: &[f64]) -> Vec<f64> {
        base.to_vec()
    }

    fn clone_box(&self) -> Box<dyn MetaLearner> {
        Box::new(self.clone())
    }
}

/// Weights members by the inverse of their backtest mean squared error
#[derive(Debug, Clone, Default)]
pub struct InverseErrorMetaLearner {
    learned: Option<Vec<f64>>,
}

impl InverseErrorMetaLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn learned_weights(&self) -> Option<&[f64]> {
        self.learned.as_deref()
    }
}

impl MetaLearner for InverseErrorMetaLearner {
    fn name(&self) -> &'static str {
        "inverse_error"
    }

    fn fit(&mut self, member_predictions: &[Vec<f64>], actuals: &[f64]) {
        if actuals.is_empty() || member_predictions.is_empty() {
            self.learned = None;
            return;
        }
        let inverse: Vec<f64> = member_predictions
            .iter()
            .map(|p| {
                let mse = stats::rmse(p, actuals).powi(2);
                1.0 / (mse + 1e-9)
            })
            .collect();
        self.learned = Some(normalize_weights(&inverse));
    }

    fn mixing_weights(&self, base: &[f64]) -> Vec<f64> {
        match &self.learned {
            Some(w) if w.len() == base.len() => w.clone(),
            _ => base.to_vec(),
        }
    }

    fn clone_box(&self) -> Box<dyn MetaLearner> {
        Box::new(self.clone())
    }
}

/// Unfitted inverse-error learner; mixes by base weights until trained
pub(crate) fn default_meta_learner() -> Box<dyn MetaLearner> {
    Box::new(InverseErrorMetaLearner::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_weighted_example() {
        let outputs = vec![vec![10.0], vec![20.0], vec![30.0]];
        let weights = normalize_weights(&[0.2, 0.3, 0.5]);
        let combined = combine_outputs(&outputs, &weights);
        assert!((combined[0] - 23.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_weights_are_uniform() {
        assert_eq!(normalize_weights(&[0.0, 0.0, 0.0, 0.0]), vec![0.25; 4]);
        assert!(normalize_weights(&[]).is_empty());
    }

    #[test]
    fn test_negative_weights_ignored() {
        assert_eq!(normalize_weights(&[-1.0, 1.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn test_inverse_error_prefers_accurate_member() {
        let mut learner = InverseErrorMetaLearner::new();
        let actuals = vec![10.0, 11.0, 12.0];
        let members = vec![vec![10.0, 11.0, 12.5], vec![15.0, 16.0, 17.0]];
        learner.fit(&members, &actuals);
        let w = learner.mixing_weights(&[0.5, 0.5]);
        assert!(w[0] > 0.9);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfitted_learner_falls_back() {
        let learner = InverseErrorMetaLearner::new();
        assert_eq!(learner.mixing_weights(&[0.3, 0.7]), vec![0.3, 0.7]);
        let fallback = WeightedFallback;
        assert_eq!(fallback.mixing_weights(&[0.3, 0.7]), vec![0.3, 0.7]);
    }

    proptest! {
        #[test]
        fn prop_normalized_weights_sum_to_one(weights in prop::collection::vec(0.0f64..1000.0, 1..20)) {
            let normalized = normalize_weights(&weights);
            prop_assert_eq!(normalized.len(), weights.len());
            prop_assert!((normalized.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(normalized.iter().all(|w| *w >= 0.0));
        }
    }
}
