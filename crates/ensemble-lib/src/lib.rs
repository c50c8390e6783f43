//! Adaptive ensemble prediction library
//!
//! This crate provides the core functionality for:
//! - Statistical predictors (time series, anomaly detection, causal inference)
//! - Ensembles with adaptive reweighting and concept drift detection
//! - Data-driven model selection
//! - Accuracy, bias and calibration monitoring
//! - A task-oriented prediction service with snapshots and observability

pub mod anomaly;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod models;
pub mod observability;
pub mod persistence;
pub mod predictor;
pub mod quality;
pub mod selector;
pub mod service;
pub mod stats;

pub use config::ServiceConfig;
pub use error::{PredictionError, Result};
pub use models::*;
pub use observability::{init_tracing, EnsembleMetrics, PredictionLogger};
pub use predictor::{ModelInstance, Predictor};
pub use service::{PredictionConfig, PredictionService, TaskEvent, TaskStatus};
