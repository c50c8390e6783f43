//! Aggregated insights over a task's recent predictions

use crate::ensemble::{DriftDetection, DriftSeverity};
use crate::models::{clamp_unit, PredictionResult};
use crate::stats;
use serde::{Deserialize, Serialize};

/// Results per comparison window for confidence-drop alerts
pub const ALERT_WINDOW: usize = 10;

/// Relative confidence drop between windows that raises an alert
const CONFIDENCE_DROP: f64 = 0.2;
const SEVERE_CONFIDENCE_DROP: f64 = 0.4;

const HIGH_RISK_CONFIDENCE: f64 = 0.6;
const MEDIUM_RISK_ALERTS: usize = 2;
const RETRAIN_CONFIDENCE: f64 = 0.7;
const LOW_STABILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn penalty(&self) -> f64 {
        match self {
            Self::Low => 0.05,
            Self::Medium => 0.1,
            Self::High => 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub sample_size: usize,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    /// `1 - coefficient of variation` of the confidences
    pub stability: f64,
    /// Accuracy from the latest ground-truth check, when one exists
    pub observed_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PerformanceDegradation,
    DataDrift,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    ModelUpdate,
    DataRefresh,
    Monitoring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationType,
    pub priority: Severity,
    pub description: String,
    pub expected_impact: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub mitigation_strategies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Opportunity,
    Risk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInsight {
    pub kind: InsightType,
    pub description: String,
    pub confidence: f64,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInsights {
    pub task_id: String,
    pub summary: String,
    pub key_insights: Vec<KeyInsight>,
    pub performance: PerformanceSummary,
    pub drift_alerts: Vec<DriftAlert>,
    /// Highest priority first
    pub recommendations: Vec<Recommendation>,
    pub risk: RiskAssessment,
    /// Mean confidence less a penalty per alert
    pub confidence: f64,
    pub generated_at: i64,
}

pub fn analyze_performance(
    results: &[PredictionResult],
    observed_accuracy: Option<f64>,
) -> PerformanceSummary {
    let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
    let stability = if confidences.len() < 2 {
        1.0
    } else {
        clamp_unit(1.0 - stats::coefficient_of_variation(&confidences))
    };
    PerformanceSummary {
        sample_size: results.len(),
        avg_confidence: stats::mean(&confidences),
        min_confidence: confidences.iter().copied().fold(f64::INFINITY, f64::min).min(1.0),
        stability,
        observed_accuracy,
    }
}

/// Confidence drop of the last window against the one before it, plus
/// the ensemble's own drift verdict when it detected drift
pub fn detect_prediction_drift(
    results: &[PredictionResult],
    last_drift: Option<&DriftDetection>,
) -> Vec<DriftAlert> {
    let mut alerts = Vec::new();

    if results.len() > ALERT_WINDOW {
        let split = results.len() - ALERT_WINDOW;
        let older = &results[split.saturating_sub(ALERT_WINDOW)..split];
        let recent_confidence =
            stats::mean(&results[split..].iter().map(|r| r.confidence).collect::<Vec<_>>());
        let older_confidence =
            stats::mean(&older.iter().map(|r| r.confidence).collect::<Vec<_>>());
        if older_confidence > 0.0 && recent_confidence < older_confidence * (1.0 - CONFIDENCE_DROP) {
            let drop = 1.0 - recent_confidence / older_confidence;
            alerts.push(DriftAlert {
                alert_type: AlertType::PerformanceDegradation,
                severity: if drop > SEVERE_CONFIDENCE_DROP {
                    Severity::High
                } else {
                    Severity::Medium
                },
                message: format!("prediction confidence dropped {:.0}%", drop * 100.0),
                magnitude: drop,
            });
        }
    }

    if let Some(drift) = last_drift.filter(|d| d.detected) {
        alerts.push(DriftAlert {
            alert_type: AlertType::DataDrift,
            severity: match drift.severity {
                DriftSeverity::High => Severity::High,
                DriftSeverity::Medium => Severity::Medium,
                DriftSeverity::Low => Severity::Low,
            },
            message: format!("{} drift in the input data", drift.drift_type.as_str()),
            magnitude: drift.drift_magnitude,
        });
    }
    alerts
}

pub fn generate_recommendations(
    performance: &PerformanceSummary,
    alerts: &[DriftAlert],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    if performance.avg_confidence < RETRAIN_CONFIDENCE {
        recommendations.push(Recommendation {
            kind: RecommendationType::ModelUpdate,
            priority: Severity::High,
            description: "Confidence is low; retrain the model".to_string(),
            expected_impact: 0.2,
        });
    }
    if !alerts.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationType::DataRefresh,
            priority: Severity::Medium,
            description: "Drift detected; refresh the training data".to_string(),
            expected_impact: 0.15,
        });
    }
    if performance.sample_size >= 2 && performance.stability < LOW_STABILITY {
        recommendations.push(Recommendation {
            kind: RecommendationType::Monitoring,
            priority: Severity::Low,
            description: "Confidence is unstable; monitor upcoming predictions".to_string(),
            expected_impact: 0.05,
        });
    }
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

/// Risk tier from mean confidence and the raised alerts
///
/// High below 0.6 mean confidence or with any high-severity alert. Medium
/// with a medium-severity alert or at least two alerts. Low otherwise.
pub fn assess_risk(
    performance: &PerformanceSummary,
    alerts: &[DriftAlert],
    recommendations: &[Recommendation],
) -> RiskAssessment {
    let mut risk_factors = Vec::new();
    if performance.avg_confidence < HIGH_RISK_CONFIDENCE {
        risk_factors.push(format!(
            "mean confidence {:.2} is below {:.2}",
            performance.avg_confidence, HIGH_RISK_CONFIDENCE
        ));
    }
    for alert in alerts {
        risk_factors.push(alert.message.clone());
    }

    let worst_alert = alerts.iter().map(|a| a.severity).max();
    let risk_level = if performance.avg_confidence < HIGH_RISK_CONFIDENCE
        || worst_alert == Some(Severity::High)
    {
        RiskLevel::High
    } else if worst_alert == Some(Severity::Medium) || alerts.len() >= MEDIUM_RISK_ALERTS {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        risk_level,
        risk_factors,
        mitigation_strategies: recommendations.iter().map(|r| r.description.clone()).collect(),
    }
}

pub fn extract_key_insights(results: &[PredictionResult]) -> Vec<KeyInsight> {
    let Some(latest) = results.last() else {
        return Vec::new();
    };
    let mut insights = Vec::new();
    if latest.confidence > 0.9 {
        insights.push(KeyInsight {
            kind: InsightType::Opportunity,
            description: "Latest prediction has high confidence and can support decisions"
                .to_string(),
            confidence: latest.confidence,
            importance: 1.0,
        });
    }
    if latest.confidence < 0.5 {
        insights.push(KeyInsight {
            kind: InsightType::Risk,
            description: "Latest prediction has low confidence; use with care".to_string(),
            confidence: 1.0 - latest.confidence,
            importance: 0.7,
        });
    }
    insights
}

pub fn summarize(
    performance: &PerformanceSummary,
    alerts: &[DriftAlert],
    recommendations: &[Recommendation],
) -> String {
    let mut parts = Vec::new();
    if performance.avg_confidence > 0.8 {
        parts.push("prediction performance is good".to_string());
    } else if performance.avg_confidence < 0.6 {
        parts.push("prediction performance needs improvement".to_string());
    }
    if !alerts.is_empty() {
        parts.push(format!("{} issue(s) detected", alerts.len()));
    }
    if !recommendations.is_empty() {
        parts.push(format!("{} recommendation(s)", recommendations.len()));
    }
    if parts.is_empty() {
        return "No notable findings.".to_string();
    }
    let mut summary = parts.join(", ");
    summary[..1].make_ascii_uppercase();
    summary.push('.');
    summary
}

pub fn overall_confidence(performance: &PerformanceSummary, alerts: &[DriftAlert]) -> f64 {
    let penalty: f64 = alerts.iter().map(|a| a.severity.penalty()).sum();
    (performance.avg_confidence - penalty).max(0.0)
}

pub fn generate_insights(
    task_id: &str,
    results: &[PredictionResult],
    last_drift: Option<&DriftDetection>,
    observed_accuracy: Option<f64>,
) -> PredictionInsights {
    let performance = analyze_performance(results, observed_accuracy);
    let drift_alerts = detect_prediction_drift(results, last_drift);
    let recommendations = generate_recommendations(&performance, &drift_alerts);
    let risk = assess_risk(&performance, &drift_alerts, &recommendations);
    PredictionInsights {
        task_id: task_id.to_string(),
        summary: summarize(&performance, &drift_alerts, &recommendations),
        key_insights: extract_key_insights(results),
        confidence: overall_confidence(&performance, &drift_alerts),
        performance,
        drift_alerts,
        recommendations,
        risk,
        generated_at: chrono::Utc::now().timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_results(confidences: &[f64]) -> Vec<PredictionResult> {
        confidences
            .iter()
            .map(|c| PredictionResult::new("task", "ensemble_weighted", vec![1.0], *c, None))
            .collect()
    }

    #[test]
    fn test_confidence_drop_alert() {
        let mut confidences = vec![0.9; 10];
        confidences.extend(vec![0.6; 10]);
        let alerts = detect_prediction_drift(&create_test_results(&confidences), None);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::PerformanceDegradation);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert!((alerts[0].magnitude - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_alert_without_prior_window() {
        let alerts = detect_prediction_drift(&create_test_results(&[0.1; 10]), None);
        assert!(alerts.is_empty());
    }

    fn create_test_alert(alert_type: AlertType, severity: Severity) -> DriftAlert {
        DriftAlert {
            alert_type,
            severity,
            message: "drift".to_string(),
            magnitude: 1.0,
        }
    }

    #[test]
    fn test_low_confidence_is_high_risk() {
        let weak = analyze_performance(&create_test_results(&[0.5, 0.5]), None);
        assert_eq!(assess_risk(&weak, &[], &[]).risk_level, RiskLevel::High);
    }

    #[test]
    fn test_severe_alert_is_high_risk() {
        let good = analyze_performance(&create_test_results(&[0.9, 0.9]), None);
        let alerts = [create_test_alert(AlertType::PerformanceDegradation, Severity::High)];
        let risk = assess_risk(&good, &alerts, &[]);
        assert_eq!(risk.risk_level, RiskLevel::High);
        assert_eq!(risk.risk_factors.len(), 1);
    }

    #[test]
    fn test_medium_risk_tier() {
        let good = analyze_performance(&create_test_results(&[0.9, 0.9]), None);
        let medium = [create_test_alert(AlertType::PerformanceDegradation, Severity::Medium)];
        assert_eq!(assess_risk(&good, &medium, &[]).risk_level, RiskLevel::Medium);

        let two_low = [
            create_test_alert(AlertType::DataDrift, Severity::Low),
            create_test_alert(AlertType::PerformanceDegradation, Severity::Low),
        ];
        assert_eq!(assess_risk(&good, &two_low, &[]).risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_low_risk_tier() {
        let good = analyze_performance(&create_test_results(&[0.9, 0.9]), None);
        assert_eq!(assess_risk(&good, &[], &[]).risk_level, RiskLevel::Low);
        let one_low = [create_test_alert(AlertType::DataDrift, Severity::Low)];
        assert_eq!(assess_risk(&good, &one_low, &[]).risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_generated_alerts_reach_medium_risk() {
        // A 25% confidence drop above the high-risk floor raises one medium alert
        let mut confidences = vec![0.96; 10];
        confidences.extend(vec![0.72; 10]);
        let insights = generate_insights("task", &create_test_results(&confidences), None, None);
        assert_eq!(insights.drift_alerts.len(), 1);
        assert_eq!(insights.drift_alerts[0].severity, Severity::Medium);
        assert_eq!(insights.risk.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_recommendations_are_prioritized() {
        let performance = analyze_performance(&create_test_results(&[0.1, 0.9]), None);
        let alert = DriftAlert {
            alert_type: AlertType::PerformanceDegradation,
            severity: Severity::Medium,
            message: "drop".to_string(),
            magnitude: 0.3,
        };
        let recommendations = generate_recommendations(&performance, &[alert]);
        let priorities: Vec<Severity> = recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Severity::High, Severity::Medium, Severity::Low]);
    }

    #[test]
    fn test_insights_penalize_alerts() {
        let mut confidences = vec![0.9; 10];
        confidences.extend(vec![0.4; 10]);
        let insights = generate_insights("task", &create_test_results(&confidences), None, None);
        // Mean 0.65, one high-severity alert (56% drop)
        assert!((insights.confidence - 0.45).abs() < 1e-9);
        assert_eq!(insights.key_insights[0].kind, InsightType::Risk);
        assert_eq!(insights.summary, "1 issue(s) detected, 2 recommendation(s).");
    }

    #[test]
    fn test_empty_results() {
        let insights = generate_insights("task", &[], None, None);
        assert_eq!(insights.performance.sample_size, 0);
        assert!(insights.key_insights.is_empty());
        assert_eq!(insights.risk.risk_level, RiskLevel::High);
    }
}
