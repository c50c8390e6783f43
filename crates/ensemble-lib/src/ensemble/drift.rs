//! Concept drift detection against a stored baseline window

use crate::models::PredictionData;
use crate::stats;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of most recent values compared on each call
pub const DEFAULT_DRIFT_WINDOW: usize = 30;

/// Drift is flagged when the magnitude exceeds this share of the baseline std
const DETECTION_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    Sudden,
    Gradual,
    Incremental,
    Recurring,
    None,
}

impl DriftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sudden => "sudden",
            Self::Gradual => "gradual",
            Self::Incremental => "incremental",
            Self::Recurring => "recurring",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    #[default]
    Low,
    Medium,
    High,
}

impl DriftSeverity {
    /// Multiplier applied to member scores when reweighting
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 0.9,
            Self::High => 0.8,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftDetection {
    pub detected: bool,
    pub drift_type: DriftType,
    pub drift_magnitude: f64,
    pub p_value: f64,
    /// Baseline mean +/- 1.96 std, absent until a baseline exists
    pub confidence_interval: Option<(f64, f64)>,
    pub threshold: f64,
    pub severity: DriftSeverity,
    pub detection_method: String,
}

impl DriftDetection {
    fn not_detected(method: &str) -> Self {
        Self {
            detected: false,
            drift_type: DriftType::None,
            drift_magnitude: 0.0,
            p_value: 1.0,
            confidence_interval: None,
            threshold: 0.0,
            severity: DriftSeverity::Low,
            detection_method: method.to_string(),
        }
    }
}

/// Owned by one adaptive ensemble; holds its baseline window exclusively
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftDetector {
    window: usize,
    baseline: Vec<f64>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_WINDOW)
    }
}

impl DriftDetector {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            baseline: Vec::new(),
        }
    }

    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }

    pub fn has_baseline(&self) -> bool {
        !self.baseline.is_empty()
    }

    pub fn reset(&mut self) {
        self.baseline.clear();
    }

    /// Compare the latest window of `data` against the baseline
    ///
    /// The first call with values stores the baseline and reports no drift.
    /// Never fails: missing history yields `detected = false`.
    pub fn detect(&mut self, data: &PredictionData) -> DriftDetection {
        let values = data.values();
        if self.baseline.is_empty() {
            if !values.is_empty() {
                let start = values.len().saturating_sub(self.window);
                self.baseline = values[start..].to_vec();
            }
            return DriftDetection::not_detected("baseline_initialization");
        }

        if values.is_empty() {
            return DriftDetection::not_detected("insufficient_data");
        }
        let recent = &values[values.len().saturating_sub(self.window)..];

        let base_mean = stats::mean(&self.baseline);
        let base_std = stats::std_dev(&self.baseline);
        let mean_shift = (stats::mean(recent) - base_mean).abs();
        let std_shift = (stats::std_dev(recent) - base_std).abs();
        let magnitude = (mean_shift + std_shift) / 2.0;
        let threshold = base_std * DETECTION_FACTOR;
        let detected = magnitude > threshold;

        let drift_type = if !detected {
            DriftType::None
        } else if mean_shift > std_shift * 2.0 {
            DriftType::Sudden
        } else if std_shift > mean_shift * 2.0 {
            DriftType::Gradual
        } else if mean_shift > 0.0 && std_shift > 0.0 {
            DriftType::Incremental
        } else {
            DriftType::Recurring
        };

        let severity = if !detected {
            DriftSeverity::Low
        } else {
            let ratio = magnitude / base_std.max(f64::EPSILON);
            if ratio > 2.0 {
                DriftSeverity::High
            } else if ratio > 1.0 {
                DriftSeverity::Medium
            } else {
                DriftSeverity::Low
            }
        };

        debug!(
            detected = detected,
            drift_type = ?drift_type,
            magnitude = magnitude,
            threshold = threshold,
            "Drift check complete"
        );

        DriftDetection {
            detected,
            drift_type,
            drift_magnitude: magnitude,
            p_value: (1.0 - magnitude).max(0.0),
            confidence_interval: Some((base_mean - 1.96 * base_std, base_mean + 1.96 * base_std)),
            threshold,
            severity,
            detection_method: "statistical_comparison".to_string(),
        }
    }
}
