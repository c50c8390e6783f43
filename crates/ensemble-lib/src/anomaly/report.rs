//! Anomaly records, summary reports and explanations

use serde::{Deserialize, Serialize};

/// Severity levels for detected anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Tier for a single anomaly score
    pub fn from_score(score: f64) -> Self {
        if score < 2.0 {
            Self::Low
        } else if score < 3.0 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Tier for a mean of severity weights
    pub fn from_aggregate(weighted: f64) -> Self {
        if weighted < 1.5 {
            Self::Low
        } else if weighted < 2.5 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Dip,
    TrendBreak,
}

/// A flagged observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Position in the scanned series
    pub index: usize,
    pub timestamp: i64,
    pub value: f64,
    /// Mean of the reference sample the value was scored against
    pub expected_value: f64,
    pub score: f64,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
}

impl Anomaly {
    /// |value - expected| relative to |expected| (or 1 when expected is ~0)
    pub fn relative_deviation(&self) -> f64 {
        let scale = if self.expected_value.abs() < f64::EPSILON {
            1.0
        } else {
            self.expected_value.abs()
        };
        (self.value - self.expected_value).abs() / scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    /// Mean severity weight (low=1, medium=2, high=3), 0 when empty
    pub aggregate_severity: f64,
    pub severity: Severity,
    pub anomaly_rate: f64,
}

impl AnomalyReport {
    pub fn new(anomalies: Vec<Anomaly>, scanned: usize) -> Self {
        let aggregate_severity = if anomalies.is_empty() {
            0.0
        } else {
            anomalies.iter().map(|a| a.severity.weight()).sum::<f64>() / anomalies.len() as f64
        };
        let anomaly_rate = if scanned == 0 {
            0.0
        } else {
            anomalies.len() as f64 / scanned as f64
        };
        Self {
            severity: Severity::from_aggregate(aggregate_severity),
            anomalies,
            aggregate_severity,
            anomaly_rate,
        }
    }

    pub fn total(&self) -> usize {
        self.anomalies.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyExplanation {
    pub index: usize,
    pub reason: String,
    pub factors: Vec<String>,
    pub recommended_action: String,
    /// Surrounding training values, up to 5 on each side
    pub context: Vec<f64>,
}

/// Likely causes, chosen by how far the value strayed from expectation
pub fn contributing_factors(anomaly: &Anomaly) -> Vec<String> {
    let deviation = anomaly.relative_deviation();
    let factors: &[&str] = if deviation > 0.5 {
        &["external event", "data collection error", "system fault"]
    } else if deviation > 0.2 {
        &["system fluctuation", "data quality issue", "normal variation"]
    } else {
        &["minor fluctuation", "measurement error", "within normal range"]
    };
    factors.iter().map(|f| f.to_string()).collect()
}

pub fn recommended_action(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "investigate immediately and take corrective action",
        Severity::Medium => "monitor closely and prepare a response",
        Severity::Low => "record the anomaly and keep observing",
    }
}

pub fn explanation_text(anomaly: &Anomaly) -> String {
    format!(
        "{} severity {:?} at timestamp {}: value {:.2}, expected {:.2} (score {:.2})",
        anomaly.severity.as_str(),
        anomaly.anomaly_type,
        anomaly.timestamp,
        anomaly.value,
        anomaly.expected_value,
        anomaly.score
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_anomaly(value: f64, expected: f64, severity: Severity) -> Anomaly {
        Anomaly {
            index: 0,
            timestamp: 0,
            value,
            expected_value: expected,
            score: 3.0,
            anomaly_type: AnomalyType::Spike,
            severity,
        }
    }

    #[test]
    fn test_severity_tiers() {
        assert_eq!(Severity::from_score(1.9), Severity::Low);
        assert_eq!(Severity::from_score(2.0), Severity::Medium);
        assert_eq!(Severity::from_score(3.0), Severity::High);
        assert_eq!(Severity::from_aggregate(1.4), Severity::Low);
        assert_eq!(Severity::from_aggregate(2.0), Severity::Medium);
        assert_eq!(Severity::from_aggregate(2.5), Severity::High);
    }

    #[test]
    fn test_report_aggregate() {
        let anomalies = vec![
            create_test_anomaly(10.0, 5.0, Severity::Low),
            create_test_anomaly(10.0, 5.0, Severity::High),
        ];
        let report = AnomalyReport::new(anomalies, 8);
        assert_eq!(report.aggregate_severity, 2.0);
        assert_eq!(report.severity, Severity::Medium);
        assert_eq!(report.anomaly_rate, 0.25);
    }

    #[test]
    fn test_empty_report() {
        let report = AnomalyReport::new(Vec::new(), 0);
        assert_eq!(report.aggregate_severity, 0.0);
        assert_eq!(report.severity, Severity::Low);
        assert_eq!(report.anomaly_rate, 0.0);
    }

    #[test]
    fn test_factors_by_deviation() {
        let large = create_test_anomaly(20.0, 10.0, Severity::High);
        assert!(contributing_factors(&large).contains(&"external event".to_string()));
        let moderate = create_test_anomaly(13.0, 10.0, Severity::Medium);
        assert!(contributing_factors(&moderate).contains(&"normal variation".to_string()));
        let small = create_test_anomaly(10.5, 10.0, Severity::Low);
        assert!(contributing_factors(&small).contains(&"measurement error".to_string()));
    }
}
