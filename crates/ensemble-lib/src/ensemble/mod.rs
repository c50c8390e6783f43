//! Ensemble combination, drift detection and adaptive reweighting

mod adaptive;
mod drift;
mod engine;
mod strategy;

pub use adaptive::{AdaptationConfig, AdaptiveEnsemble, PerformanceRecord, WeightUpdate};
pub use drift::{DriftDetection, DriftDetector, DriftSeverity, DriftType, DEFAULT_DRIFT_WINDOW};
pub use engine::{EnsembleEngine, EnsembleEvaluation, MemberEvaluation};
pub use strategy::{
    combine_outputs, normalize_weights, EnsembleStrategy, InverseErrorMetaLearner, MetaLearner,
    WeightedFallback,
};
