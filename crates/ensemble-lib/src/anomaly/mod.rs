//! Anomaly detection for numeric series
//!
//! This module provides:
//! - Leave-one-out z-score and IQR fence detection
//! - Spike / dip / trend-break classification from local context
//! - Severity summaries and explanations for reporting layers

mod detector;
mod report;

pub use detector::{
    AnomalyDetectionEngine, BaselineStats, DetectionMethod, DEFAULT_THRESHOLD, MAX_SCORE,
};
pub use report::{
    contributing_factors, recommended_action, Anomaly, AnomalyExplanation, AnomalyReport,
    AnomalyType, Severity,
};
