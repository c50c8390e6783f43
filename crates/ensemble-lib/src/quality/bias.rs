//! Group fairness metrics over predictions

use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric value below which a fairness dimension needs attention
pub const FAIRNESS_THRESHOLD: f64 = 0.8;

/// Group membership of prediction indices
///
/// `labels` are the observed outcomes aligned with the predictions; they
/// are only needed for equal opportunity. An outcome or prediction counts
/// as positive when it reaches `positive_threshold` (default: mean label,
/// or mean prediction without labels).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitiveGroups {
    pub groups: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    pub labels: Option<Vec<f64>>,
    #[serde(default)]
    pub positive_threshold: Option<f64>,
}

impl SensitiveGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: impl Into<String>, indices: Vec<usize>) -> Self {
        self.groups.insert(name.into(), indices);
        self
    }

    pub fn with_labels(mut self, labels: Vec<f64>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_positive_threshold(mut self, threshold: f64) -> Self {
        self.positive_threshold = Some(threshold);
        self
    }

    /// Values of `series` for each group, out-of-range indices dropped
    fn group_values(&self, series: &[f64]) -> BTreeMap<&str, Vec<f64>> {
        self.groups
            .iter()
            .map(|(name, indices)| {
                let values = indices.iter().filter_map(|i| series.get(*i).copied()).collect();
                (name.as_str(), values)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasLevel {
    Low,
    Medium,
    High,
}

impl BiasLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Low
        } else if score >= 0.6 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Higher is fairer
    pub(crate) fn rank(&self) -> f64 {
        match self {
            Self::High => 0.0,
            Self::Medium => 1.0,
            Self::Low => 2.0,
        }
    }
}

/// Each metric is in [0, 1] with 1 meaning parity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasMetrics {
    pub demographic_parity: f64,
    pub disparate_impact_ratio: f64,
    pub equal_opportunity: f64,
}

impl BiasMetrics {
    /// `1 - disparate_impact_ratio`: 0 at parity, growing with the disparity
    pub fn disparate_impact_gap(&self) -> f64 {
        1.0 - self.disparate_impact_ratio
    }

    pub fn fairness_score(&self) -> f64 {
        (self.demographic_parity + self.disparate_impact_ratio + self.equal_opportunity) / 3.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub model_id: String,
    pub overall: BiasLevel,
    pub fairness_score: f64,
    pub metrics: BiasMetrics,
    pub recommendations: Vec<String>,
    pub affected_groups: Vec<String>,
    pub mitigation: Vec<String>,
    pub generated_at: i64,
}

/// `1 - max |group mean - mean of group means|`, floored at 0
pub fn demographic_parity(predictions: &[f64], groups: &SensitiveGroups) -> f64 {
    let means: Vec<f64> = groups
        .group_values(predictions)
        .values()
        .filter(|v| !v.is_empty())
        .map(|v| stats::mean(v))
        .collect();
    if means.len() < 2 {
        return 1.0;
    }
    let center = stats::mean(&means);
    let max_difference = means
        .iter()
        .map(|m| (m - center).abs())
        .fold(0.0, f64::max);
    (1.0 - max_difference).max(0.0)
}

/// Ratio of the lowest to the highest group mean; 1 at parity
///
/// This is the fairness-oriented form. [`BiasMetrics::disparate_impact_gap`]
/// gives the complementary `1 - min/max` disparity.
pub fn disparate_impact_ratio(predictions: &[f64], groups: &SensitiveGroups) -> f64 {
    let means: Vec<f64> = groups
        .group_values(predictions)
        .values()
        .filter(|v| !v.is_empty())
        .map(|v| stats::mean(v))
        .collect();
    if means.len() < 2 {
        return 1.0;
    }
    let max = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = means.iter().copied().fold(f64::INFINITY, f64::min);
    if max <= 0.0 {
        return 1.0;
    }
    (min / max).clamp(0.0, 1.0)
}

/// `1 - (max TPR - min TPR)` across groups with positive outcomes
///
/// Returns 1 when labels are absent or fewer than two groups have any
/// positive outcome.
pub fn equal_opportunity(predictions: &[f64], groups: &SensitiveGroups) -> f64 {
    let Some(labels) = groups.labels.as_deref() else {
        return 1.0;
    };
    let threshold = groups.positive_threshold.unwrap_or_else(|| stats::mean(labels));
    let rates: Vec<f64> = groups
        .groups
        .values()
        .filter_map(|indices| {
            let (true_positive, positive) = indices
                .iter()
                .filter_map(|i| Some((*predictions.get(*i)?, *labels.get(*i)?)))
                .filter(|(_, label)| *label >= threshold)
                .fold((0usize, 0usize), |(tp, p), (prediction, _)| {
                    (tp + usize::from(prediction >= threshold), p + 1)
                });
            (positive > 0).then(|| true_positive as f64 / positive as f64)
        })
        .collect();
    if rates.len() < 2 {
        return 1.0;
    }
    let max = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = rates.iter().copied().fold(f64::INFINITY, f64::min);
    1.0 - (max - min)
}

pub fn assess_bias(model_id: &str, predictions: &[f64], groups: &SensitiveGroups) -> BiasReport {
    let metrics = BiasMetrics {
        demographic_parity: demographic_parity(predictions, groups),
        disparate_impact_ratio: disparate_impact_ratio(predictions, groups),
        equal_opportunity: equal_opportunity(predictions, groups),
    };
    let fairness_score = metrics.fairness_score();
    BiasReport {
        model_id: model_id.to_string(),
        overall: BiasLevel::from_score(fairness_score),
        fairness_score,
        metrics,
        recommendations: recommendations(&metrics),
        affected_groups: affected_groups(predictions, groups),
        mitigation: mitigation_plan(&metrics),
        generated_at: chrono::Utc::now().timestamp_millis(),
    }
}

/// Groups with at least one prediction
fn affected_groups(predictions: &[f64], groups: &SensitiveGroups) -> Vec<String> {
    groups
        .group_values(predictions)
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(name, _)| name.to_string())
        .collect()
}

fn recommendations(metrics: &BiasMetrics) -> Vec<String> {
    let mut recommendations = Vec::new();
    if metrics.demographic_parity < FAIRNESS_THRESHOLD {
        recommendations.push("Apply a demographic parity correction".to_string());
    }
    if metrics.disparate_impact_ratio < FAIRNESS_THRESHOLD {
        recommendations.push(format!(
            "Run a disparate impact analysis and adjust the model (gap {:.0}%)",
            metrics.disparate_impact_gap() * 100.0
        ));
    }
    if metrics.equal_opportunity < FAIRNESS_THRESHOLD {
        recommendations.push("Constrain training for equal opportunity".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Bias is within acceptable limits".to_string());
    }
    recommendations
}

fn mitigation_plan(metrics: &BiasMetrics) -> Vec<String> {
    let mut mitigation = vec![
        "Monitor bias metrics on a schedule".to_string(),
        "Alert when a fairness metric drops below threshold".to_string(),
        "Retrain and revalidate after mitigation".to_string(),
    ];
    if metrics.demographic_parity < FAIRNESS_THRESHOLD {
        mitigation.push("Train with a demographic parity constraint".to_string());
    }
    if metrics.disparate_impact_ratio < FAIRNESS_THRESHOLD {
        mitigation.push("Use fairness-aware reweighting of training samples".to_string());
    }
    if metrics.equal_opportunity < FAIRNESS_THRESHOLD {
        mitigation.push("Equalize true positive rates with per-group thresholds".to_string());
    }
    mitigation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> SensitiveGroups {
        SensitiveGroups::new()
            .with_group("a", vec![0, 1])
            .with_group("b", vec![2, 3])
    }

    #[test]
    fn test_parity_for_identical_groups() {
        let report = assess_bias("m", &[0.5, 0.5, 0.5, 0.5], &two_groups());
        assert_eq!(report.metrics.demographic_parity, 1.0);
        assert_eq!(report.metrics.disparate_impact_ratio, 1.0);
        assert_eq!(report.overall, BiasLevel::Low);
        assert_eq!(report.recommendations, vec!["Bias is within acceptable limits"]);
        assert_eq!(report.affected_groups, vec!["a", "b"]);
    }

    #[test]
    fn test_parity_decreases_with_divergence() {
        let groups = two_groups();
        let mut previous = f64::INFINITY;
        for gap in [0.0, 0.1, 0.3, 0.6, 1.0] {
            let predictions = [0.5, 0.5, 0.5 + gap, 0.5 + gap];
            let parity = demographic_parity(&predictions, &groups);
            assert!(parity < previous || (gap == 0.0 && parity == 1.0));
            previous = parity;
        }
    }

    #[test]
    fn test_disparate_impact_ratio() {
        let impact = disparate_impact_ratio(&[1.0, 1.0, 4.0, 4.0], &two_groups());
        assert!((impact - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_disparate_impact_gap_is_complement() {
        let report = assess_bias("m", &[1.0, 1.0, 4.0, 4.0], &two_groups());
        assert!((report.metrics.disparate_impact_ratio - 0.25).abs() < 1e-9);
        assert!((report.metrics.disparate_impact_gap() - 0.75).abs() < 1e-9);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("disparate impact") && r.contains("gap 75%")));
    }

    #[test]
    fn test_equal_opportunity_from_true_positive_rates() {
        // Both groups have two positive outcomes; a catches both, b catches one
        let groups = SensitiveGroups::new()
            .with_group("a", vec![0, 1, 2])
            .with_group("b", vec![3, 4, 5])
            .with_labels(vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0])
            .with_positive_threshold(0.5);
        let predictions = [0.9, 0.8, 0.1, 0.9, 0.2, 0.1];
        assert!((equal_opportunity(&predictions, &groups) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_equal_opportunity_without_labels_is_neutral() {
        assert_eq!(equal_opportunity(&[1.0, 0.0], &two_groups()), 1.0);
    }

    #[test]
    fn test_high_bias_report() {
        let groups = two_groups()
            .with_labels(vec![1.0, 1.0, 1.0, 1.0])
            .with_positive_threshold(0.5);
        let report = assess_bias("m", &[0.0, 0.0, 2.0, 2.0], &groups);
        assert_eq!(report.overall, BiasLevel::High);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(report.mitigation.len(), 6);
    }

    #[test]
    fn test_out_of_range_indices_ignored() {
        let groups = SensitiveGroups::new()
            .with_group("a", vec![0, 10])
            .with_group("b", vec![1, 20]);
        assert_eq!(demographic_parity(&[1.0, 1.0], &groups), 1.0);
    }
}
