//! Observability infrastructure for the prediction subsystem
//!
//! Provides:
//! - Prometheus metrics (training/prediction latency, member failures, drift, task gauges)
//! - Structured event logging with tracing
//! - Subscriber setup for embedding hosts

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EnsembleMetricsInner> = OnceLock::new();

struct EnsembleMetricsInner {
    training_latency_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    predictions_generated: IntCounter,
    prediction_errors: IntCounter,
    member_failures: IntCounter,
    drift_detections: IntCounter,
    training_timeouts: IntCounter,
    active_tasks: IntGauge,
    stream_predictors: IntGauge,
}

impl EnsembleMetricsInner {
    fn new() -> Self {
        Self {
            training_latency_seconds: register_histogram!(
                "ensemble_training_latency_seconds",
                "Time spent training an ensemble",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register training_latency_seconds"),

            prediction_latency_seconds: register_histogram!(
                "ensemble_prediction_latency_seconds",
                "Time spent combining member predictions",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_generated: register_int_counter!(
                "ensemble_predictions_generated_total",
                "Total number of predictions generated"
            )
            .expect("Failed to register predictions_generated"),

            prediction_errors: register_int_counter!(
                "ensemble_prediction_errors_total",
                "Total number of failed prediction tasks"
            )
            .expect("Failed to register prediction_errors"),

            member_failures: register_int_counter!(
                "ensemble_member_failures_total",
                "Member train or predict calls that failed and were tolerated"
            )
            .expect("Failed to register member_failures"),

            drift_detections: register_int_counter!(
                "ensemble_drift_detections_total",
                "Number of drift checks that reported drift"
            )
            .expect("Failed to register drift_detections"),

            training_timeouts: register_int_counter!(
                "ensemble_training_timeouts_total",
                "Retraining runs abandoned after the configured timeout"
            )
            .expect("Failed to register training_timeouts"),

            active_tasks: register_int_gauge!(
                "ensemble_active_tasks",
                "Number of prediction tasks currently held"
            )
            .expect("Failed to register active_tasks"),

            stream_predictors: register_int_gauge!(
                "ensemble_stream_predictors",
                "Number of real-time stream predictors"
            )
            .expect("Failed to register stream_predictors"),
        }
    }
}

/// Lightweight handle to the global metrics instance
///
/// Multiple handles share the same underlying metrics.
#[derive(Clone)]
pub struct EnsembleMetrics {
    _private: (),
}

impl Default for EnsembleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EnsembleMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EnsembleMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EnsembleMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_training_latency(&self, duration_secs: f64) {
        self.inner().training_latency_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions_generated(&self) {
        self.inner().predictions_generated.inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_member_failures(&self) {
        self.inner().member_failures.inc();
    }

    pub fn inc_drift_detections(&self) {
        self.inner().drift_detections.inc();
    }

    pub fn inc_training_timeouts(&self) {
        self.inner().training_timeouts.inc();
    }

    pub fn set_active_tasks(&self, count: i64) {
        self.inner().active_tasks.set(count);
    }

    pub fn set_stream_predictors(&self, count: i64) {
        self.inner().stream_predictors.set(count);
    }
}

/// Install a global tracing subscriber
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Returns `false`
/// when a subscriber was already installed by the host.
pub fn init_tracing(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init().is_ok()
    } else {
        registry.with(fmt::layer()).try_init().is_ok()
    }
}

/// Structured logger for prediction service events
#[derive(Clone)]
pub struct PredictionLogger {
    service_name: String,
}

impl PredictionLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn log_task_created(&self, task_id: &str, task_type: &str, models: &[String]) {
        info!(
            event = "task_created",
            service = %self.service_name,
            task_id = %task_id,
            task_type = %task_type,
            models = ?models,
            "Prediction task created"
        );
    }

    pub fn log_prediction(
        &self,
        task_id: &str,
        model_id: &str,
        horizon: usize,
        confidence: f64,
        methodology: &str,
    ) {
        info!(
            event = "prediction_generated",
            service = %self.service_name,
            task_id = %task_id,
            model_id = %model_id,
            horizon = horizon,
            confidence = confidence,
            methodology = %methodology,
            "Generated prediction"
        );
    }

    pub fn log_task_failed(&self, task_id: &str, stage: &str, error: &str) {
        warn!(
            event = "task_failed",
            service = %self.service_name,
            task_id = %task_id,
            stage = %stage,
            error = %error,
            "Prediction task failed"
        );
    }

    pub fn log_drift(&self, task_id: &str, drift_type: &str, severity: &str, magnitude: f64) {
        warn!(
            event = "drift_detected",
            service = %self.service_name,
            task_id = %task_id,
            drift_type = %drift_type,
            severity = %severity,
            magnitude = magnitude,
            "Concept drift detected"
        );
    }

    pub fn log_weight_update(&self, task_id: &str, weight_change: f64, reason: &str) {
        info!(
            event = "weights_adapted",
            service = %self.service_name,
            task_id = %task_id,
            weight_change = weight_change,
            reason = %reason,
            "Ensemble weights adapted"
        );
    }

    pub fn log_model_update(&self, task_id: &str, training_score: Option<f64>, success: bool) {
        if success {
            info!(
                event = "model_updated",
                service = %self.service_name,
                task_id = %task_id,
                training_score = ?training_score,
                "Ensemble retrained successfully"
            );
        } else {
            warn!(
                event = "model_update_failed",
                service = %self.service_name,
                task_id = %task_id,
                "Ensemble retrain failed, keeping previous version"
            );
        }
    }

    pub fn log_low_confidence(&self, model_id: &str, confidence: f64, very_low: bool) {
        if very_low {
            warn!(
                event = "very_low_confidence",
                service = %self.service_name,
                model_id = %model_id,
                confidence = confidence,
                "Very low prediction confidence"
            );
        } else {
            warn!(
                event = "low_confidence",
                service = %self.service_name,
                model_id = %model_id,
                confidence = confidence,
                "Low prediction confidence"
            );
        }
    }

    pub fn log_bias_assessment(&self, model_id: &str, overall: &str, fairness_score: f64) {
        match overall {
            "high" => warn!(
                event = "bias_assessed",
                service = %self.service_name,
                model_id = %model_id,
                overall = %overall,
                fairness_score = fairness_score,
                "High prediction bias detected"
            ),
            _ => info!(
                event = "bias_assessed",
                service = %self.service_name,
                model_id = %model_id,
                overall = %overall,
                fairness_score = fairness_score,
                "Bias assessment complete"
            ),
        }
    }

    pub fn log_task_deleted(&self, task_id: &str) {
        info!(
            event = "task_deleted",
            service = %self.service_name,
            task_id = %task_id,
            "Prediction task deleted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = EnsembleMetrics::new();
        metrics.observe_training_latency(0.5);
        metrics.observe_prediction_latency(0.002);
        metrics.inc_member_failures();
        metrics.inc_drift_detections();
        metrics.set_active_tasks(3);

        // A second handle must not re-register
        let other = EnsembleMetrics::default();
        other.set_stream_predictors(1);
        other.inc_predictions_generated();
    }

    #[test]
    fn test_prediction_logger_creation() {
        let logger = PredictionLogger::new("test-service");
        assert_eq!(logger.service_name, "test-service");
        logger.log_prediction("task", "model", 3, 0.8, "ensemble_weighted");
    }
}
