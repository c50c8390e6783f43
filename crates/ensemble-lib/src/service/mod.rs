//! Prediction service facade
//!
//! Owns the task store, the stream predictors, the model selector and the
//! process-wide quality monitor. Each task is guarded by its own async
//! mutex so training and prediction on one task never overlap, while
//! different tasks proceed independently.

mod insights;
mod stream;
mod task;

pub use insights::{
    generate_insights, AlertType, DriftAlert, InsightType, KeyInsight, PerformanceSummary,
    PredictionInsights, Recommendation, RecommendationType, RiskAssessment, RiskLevel, Severity,
    ALERT_WINDOW,
};
pub use stream::{DataStream, StreamingPrediction};
pub use task::{
    infer_task_type, parse_plan, PredictionConfig, PredictionTask, Subtask, SubtaskOutcome,
    TaskEvent, TaskStatus, TaskStatusReport,
};

use crate::config::ServiceConfig;
use crate::ensemble::{AdaptiveEnsemble, DriftSeverity, WeightUpdate};
use crate::error::{PredictionError, Result};
use crate::models::{PredictionData, PredictionResult, TrainingResult};
use crate::observability::{EnsembleMetrics, PredictionLogger};
use crate::persistence::{decode_snapshot, encode_snapshot, ModelPersistence};
use crate::predictor::Predictor;
use crate::quality::{
    BiasReport, CalibrationResult, PredictionQualityMonitor, QualityMetrics, QualityStatistics,
    SensitiveGroups,
};
use crate::selector::DynamicModelSelector;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Instant;
use stream::StreamPredictors;
use task::TaskState;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Trailing points used by the evaluation subtask and after retraining
const EVALUATION_WINDOW: usize = 30;

/// Results per task considered by insight generation
const INSIGHT_RESULTS: usize = 2 * ALERT_WINDOW;

#[derive(Debug, Clone)]
struct HistoryEntry {
    task_id: String,
    result: PredictionResult,
}

pub struct PredictionService {
    config: ServiceConfig,
    tasks: DashMap<String, Arc<Mutex<TaskState>>>,
    streams: StreamPredictors,
    selector: StdMutex<DynamicModelSelector>,
    monitor: PredictionQualityMonitor,
    history: RwLock<VecDeque<HistoryEntry>>,
    event_tx: mpsc::Sender<TaskEvent>,
    logger: PredictionLogger,
    metrics: EnsembleMetrics,
}

impl PredictionService {
    /// Create the service and the receiving end of its event channel
    pub fn new(config: ServiceConfig) -> (Self, mpsc::Receiver<TaskEvent>) {
        Self::with_selector(config, DynamicModelSelector::default())
    }

    pub fn with_selector(
        config: ServiceConfig,
        selector: DynamicModelSelector,
    ) -> (Self, mpsc::Receiver<TaskEvent>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let service = Self {
            streams: StreamPredictors::new(config.realtime_window),
            monitor: PredictionQualityMonitor::new(
                config.monitor_history_limit,
                config.bias_history_limit,
            ),
            tasks: DashMap::new(),
            selector: StdMutex::new(selector),
            history: RwLock::new(VecDeque::new()),
            event_tx: tx,
            logger: PredictionLogger::new("prediction-service"),
            metrics: EnsembleMetrics::new(),
            config,
        };
        (service, rx)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn quality_monitor(&self) -> &PredictionQualityMonitor {
        &self.monitor
    }

    fn emit(&self, event: TaskEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!(error = %e, "Task event dropped");
        }
    }

    fn task(&self, task_id: &str) -> Result<Arc<Mutex<TaskState>>> {
        self.tasks
            .get(task_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PredictionError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    fn fail_creation(&self, task_id: &str, stage: &str, error: &PredictionError) {
        self.logger.log_task_failed(task_id, stage, &error.to_string());
        self.emit(TaskEvent::TaskFailed {
            task_id: task_id.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }

    /// Train `ensemble` in place, bounded by the configured timeout
    async fn train_with_timeout(
        &self,
        ensemble: &mut AdaptiveEnsemble,
        data: Arc<PredictionData>,
    ) -> Result<TrainingResult> {
        match tokio::time::timeout(self.config.training_timeout(), ensemble.train_concurrent(data))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                self.metrics.inc_training_timeouts();
                Err(PredictionError::TrainingTimeout {
                    timeout_ms: self.config.training_timeout_ms,
                })
            }
        }
    }

    /// Select models for `data`, build an adaptive ensemble from them and train it
    pub async fn create_task(
        &self,
        config: PredictionConfig,
        data: PredictionData,
    ) -> Result<PredictionTask> {
        let task_id = format!("task_{}", uuid::Uuid::new_v4().simple());
        data.validate()?;
        let plan = parse_plan(&config.subtasks)?;
        let task_type = config.task_type.unwrap_or_else(|| infer_task_type(&data));

        let selection = {
            let mut selector = self.selector.lock().unwrap_or_else(PoisonError::into_inner);
            selector.select_optimal_model(&data, task_type, config.priority, &config.constraints)
        };
        let selection = match selection {
            Ok(selection) => selection,
            Err(e) => {
                self.fail_creation(&task_id, "model_selection", &e);
                return Err(e);
            }
        };

        let mut ensemble =
            AdaptiveEnsemble::with_config(&task_id, config.strategy, self.config.adaptation());
        {
            let selector = self.selector.lock().unwrap_or_else(PoisonError::into_inner);
            for model_id in selection.model_set() {
                match selector
                    .registry()
                    .instantiate(&model_id, &format!("{}:{}", task_id, model_id))
                {
                    Ok(instance) => ensemble.add_member(instance, 1.0),
                    Err(e) => warn!(task_id = %task_id, model = %model_id, error = %e, "Skipping model"),
                }
            }
        }
        if ensemble.engine().members().is_empty() {
            let e = PredictionError::NoPredictors;
            self.fail_creation(&task_id, "ensemble_build", &e);
            return Err(e);
        }

        let data = Arc::new(data);
        let training = match self.train_with_timeout(&mut ensemble, Arc::clone(&data)).await {
            Ok(training) => training,
            Err(e) => {
                self.fail_creation(&task_id, "training", &e);
                return Err(e);
            }
        };
        // First call stores the drift baseline
        ensemble.detect_concept_drift(&data);

        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("prediction task {}", task_id));
        let models = ensemble.engine().member_ids();
        let created_at = chrono::Utc::now().timestamp_millis();
        let state = TaskState {
            task_id: task_id.clone(),
            name: name.clone(),
            task_type,
            status: TaskStatus::Pending,
            ensemble,
            data,
            selection: selection.clone(),
            plan,
            horizon: config.horizon.unwrap_or(self.config.default_horizon).max(1),
            created_at,
            last_updated: None,
            last_error: None,
            last_drift: None,
            last_outcomes: Vec::new(),
            prediction_count: 0,
        };
        self.tasks
            .insert(task_id.clone(), Arc::new(Mutex::new(state)));
        self.metrics.set_active_tasks(self.tasks.len() as i64);

        self.logger
            .log_task_created(&task_id, task_type.as_str(), &models);
        self.emit(TaskEvent::TaskCreated {
            task_id: task_id.clone(),
            task_type,
            models,
        });

        Ok(PredictionTask {
            description: format!("adaptive ensemble led by {}", selection.selected_model),
            task_id,
            name,
            task_type,
            priority: config.priority,
            status: TaskStatus::Pending,
            selection,
            training_score: training.training_score,
            created_at,
        })
    }

    /// Run the task's execution plan and return its prediction
    ///
    /// `data` defaults to the task's training data and `horizon` to the
    /// task's configured horizon. A cancelled token stops the call before
    /// any work starts.
    pub async fn execute_prediction(
        &self,
        task_id: &str,
        data: Option<PredictionData>,
        horizon: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<PredictionResult> {
        if cancel.is_cancelled() {
            return Err(PredictionError::Cancelled);
        }
        let task = self.task(task_id)?;
        let mut state = task.lock().await;
        if cancel.is_cancelled() {
            return Err(PredictionError::Cancelled);
        }

        let data = match data {
            Some(data) => {
                data.validate()?;
                Arc::new(data)
            }
            None => Arc::clone(&state.data),
        };
        let horizon = horizon.unwrap_or(state.horizon);
        state.status = TaskStatus::Executing;
        state.last_outcomes.clear();

        let mut prediction = None;
        for subtask in state.plan.clone() {
            let started = Instant::now();
            let outcome = self.run_subtask(&mut state, subtask, &data, horizon);
            let (success, error) = match outcome {
                Ok(Some(result)) => {
                    prediction = Some(result);
                    (true, None)
                }
                Ok(None) => (true, None),
                Err(e) if subtask.is_critical() => {
                    state.fail(&e);
                    self.metrics.inc_prediction_errors();
                    self.logger
                        .log_task_failed(task_id, subtask.as_str(), &e.to_string());
                    self.emit(TaskEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        stage: subtask.as_str().to_string(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
                Err(e) => {
                    warn!(task_id = %task_id, subtask = %subtask, error = %e, "Subtask failed");
                    (false, Some(e.to_string()))
                }
            };
            state.last_outcomes.push(SubtaskOutcome {
                subtask,
                success,
                error,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let result = prediction.ok_or_else(|| {
            PredictionError::InvalidInput("execution plan produced no prediction".to_string())
        })?;
        state.status = TaskStatus::Completed;
        state.last_error = None;
        state.prediction_count += 1;
        drop(state);

        self.record_history(task_id, &result);
        self.monitor.record_prediction(&result);
        self.metrics.inc_predictions_generated();
        self.logger.log_prediction(
            task_id,
            &result.model_id,
            result.horizon,
            result.confidence,
            &result.methodology,
        );
        self.emit(TaskEvent::TaskCompleted {
            task_id: task_id.to_string(),
            prediction_id: result.id.clone(),
            confidence: result.confidence,
        });
        Ok(result)
    }

    fn run_subtask(
        &self,
        state: &mut TaskState,
        subtask: Subtask,
        data: &PredictionData,
        horizon: usize,
    ) -> Result<Option<PredictionResult>> {
        match subtask {
            Subtask::DriftCheck => {
                let detection = state.ensemble.detect_concept_drift(data);
                if detection.detected {
                    self.metrics.inc_drift_detections();
                    self.logger.log_drift(
                        &state.task_id,
                        detection.drift_type.as_str(),
                        detection.severity.as_str(),
                        detection.drift_magnitude,
                    );
                }
                state.last_drift = Some(detection);
                Ok(None)
            }
            Subtask::Prediction => state.ensemble.predict(data, horizon).map(Some),
            Subtask::Evaluation => {
                let window = data.tail(EVALUATION_WINDOW);
                let evaluation = state.ensemble.evaluate_members(&window)?;
                debug!(
                    task_id = %state.task_id,
                    metrics = ?evaluation.metrics,
                    "Evaluated ensemble"
                );
                Ok(None)
            }
        }
    }

    fn record_history(&self, task_id: &str, result: &PredictionResult) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.push_back(HistoryEntry {
            task_id: task_id.to_string(),
            result: result.clone(),
        });
        while history.len() > self.config.prediction_history_limit.max(1) {
            history.pop_front();
        }
    }

    fn task_results(&self, task_id: &str, limit: usize) -> Vec<PredictionResult> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<PredictionResult> = history
            .iter()
            .rev()
            .filter(|entry| entry.task_id == task_id)
            .take(limit)
            .map(|entry| entry.result.clone())
            .collect();
        results.reverse();
        results
    }

    /// One-step prediction from the stream's own time series predictor
    pub async fn execute_realtime_prediction(
        &self,
        stream: &DataStream,
    ) -> Result<StreamingPrediction> {
        let prediction = self.streams.predict(stream).await;
        self.metrics.set_stream_predictors(self.streams.len() as i64);
        match prediction {
            Ok(prediction) => {
                self.monitor.record_prediction(&prediction.result);
                self.metrics.inc_predictions_generated();
                Ok(prediction)
            }
            Err(e) => {
                self.metrics.inc_prediction_errors();
                Err(e)
            }
        }
    }

    pub fn remove_stream(&self, stream_id: &str) -> bool {
        let removed = self.streams.remove(stream_id);
        self.metrics.set_stream_predictors(self.streams.len() as i64);
        removed
    }

    /// Insights over `results`, or over the task's most recent predictions
    pub async fn generate_prediction_insights(
        &self,
        task_id: &str,
        results: Option<&[PredictionResult]>,
    ) -> Result<PredictionInsights> {
        let task = self.task(task_id)?;
        let last_drift = task.lock().await.last_drift.clone();
        let recent;
        let results = match results {
            Some(results) => results,
            None => {
                recent = self.task_results(task_id, INSIGHT_RESULTS);
                &recent
            }
        };
        let observed_accuracy = self
            .monitor
            .get_quality_statistics()
            .recent_metrics
            .map(|m| m.accuracy);
        Ok(generate_insights(
            task_id,
            results,
            last_drift.as_ref(),
            observed_accuracy,
        ))
    }

    /// Check drift on `new_data`, retrain a copy of the ensemble and
    /// reweight it; the task keeps its old ensemble if retraining fails
    pub async fn update_model(&self, task_id: &str, new_data: PredictionData) -> Result<WeightUpdate> {
        new_data.validate()?;
        let task = self.task(task_id)?;
        let mut state = task.lock().await;

        let drift = state.ensemble.detect_concept_drift(&new_data);
        if drift.detected {
            self.metrics.inc_drift_detections();
            self.logger.log_drift(
                task_id,
                drift.drift_type.as_str(),
                drift.severity.as_str(),
                drift.drift_magnitude,
            );
        }
        let severity = if drift.detected {
            drift.severity
        } else {
            DriftSeverity::Low
        };

        let data = Arc::new(new_data);
        let mut candidate = state.ensemble.clone();
        let training = match self.train_with_timeout(&mut candidate, Arc::clone(&data)).await {
            Ok(training) => training,
            Err(e) => {
                self.logger.log_model_update(task_id, None, false);
                return Err(e);
            }
        };
        if let Err(e) = candidate.evaluate_members(&data.tail(EVALUATION_WINDOW)) {
            warn!(task_id = %task_id, error = %e, "Post-training evaluation failed");
        }
        let update = candidate.adapt_from_recorded(severity);

        state.ensemble = candidate;
        state.data = data;
        state.last_updated = Some(chrono::Utc::now().timestamp_millis());
        state.last_drift = Some(drift.clone());
        drop(state);

        self.logger
            .log_model_update(task_id, Some(training.training_score), true);
        self.logger
            .log_weight_update(task_id, update.weight_change, &update.adaptation_reason);
        self.emit(TaskEvent::ModelUpdated {
            task_id: task_id.to_string(),
            drift_detected: drift.detected,
            weight_change: update.weight_change,
        });
        info!(
            task_id = %task_id,
            drift = drift.detected,
            training_score = training.training_score,
            "Model updated"
        );
        Ok(update)
    }

    pub async fn get_task_status(&self, task_id: &str) -> Option<TaskStatusReport> {
        let task = self.task(task_id).ok()?;
        let report = task.lock().await.report();
        Some(report)
    }

    pub fn list_active_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Drop the task and its prediction history
    pub fn delete_task(&self, task_id: &str) -> Result<()> {
        if self.tasks.remove(task_id).is_none() {
            return Err(PredictionError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|entry| entry.task_id != task_id);
        self.metrics.set_active_tasks(self.tasks.len() as i64);
        self.logger.log_task_deleted(task_id);
        self.emit(TaskEvent::TaskDeleted {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    pub fn monitor_prediction_quality(
        &self,
        results: &[PredictionResult],
        ground_truth: &[f64],
    ) -> Result<QualityMetrics> {
        self.monitor.monitor_prediction_accuracy(results, ground_truth)
    }

    pub fn detect_prediction_bias(
        &self,
        results: &[PredictionResult],
        groups: &SensitiveGroups,
    ) -> BiasReport {
        self.monitor.detect_prediction_bias(results, groups)
    }

    pub fn calibrate_prediction_uncertainty(
        &self,
        results: &[PredictionResult],
        ground_truth: &[f64],
    ) -> Result<CalibrationResult> {
        self.monitor
            .calibrate_prediction_uncertainty(results, ground_truth)
    }

    pub fn quality_statistics(&self) -> QualityStatistics {
        self.monitor.get_quality_statistics()
    }

    /// Checksummed JSON snapshot of the task's ensemble
    pub async fn save_model(&self, task_id: &str) -> Result<Vec<u8>> {
        let task = self.task(task_id)?;
        let state = task.lock().await;
        encode_snapshot(task_id, &state.ensemble)
    }

    /// Replace the task's ensemble with a snapshot taken by [`save_model`](Self::save_model)
    pub async fn load_model(&self, task_id: &str, blob: &[u8]) -> Result<()> {
        let ensemble = decode_snapshot(task_id, blob)?;
        if ensemble.engine().members().is_empty() {
            return Err(PredictionError::NoPredictors);
        }
        let task = self.task(task_id)?;
        let mut state = task.lock().await;
        state.ensemble = ensemble;
        state.last_updated = Some(chrono::Utc::now().timestamp_millis());
        info!(task_id = %task_id, "Model restored from snapshot");
        Ok(())
    }

    pub async fn persist_model(&self, task_id: &str, store: &dyn ModelPersistence) -> Result<()> {
        let blob = self.save_model(task_id).await?;
        store.save(task_id, &blob)
    }

    /// Returns `false` when the store holds nothing for the task
    pub async fn restore_model(&self, task_id: &str, store: &dyn ModelPersistence) -> Result<bool> {
        match store.load(task_id)? {
            Some(blob) => {
                self.load_model(task_id, &blob).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleStrategy;
    use crate::models::TaskType;

    fn create_test_series(n: usize) -> PredictionData {
        let values: Vec<f64> = (0..n)
            .map(|i| 100.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        PredictionData::from_values(&values)
    }

    fn create_test_service() -> (PredictionService, mpsc::Receiver<TaskEvent>) {
        PredictionService::new(ServiceConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_execute() {
        let (service, mut events) = create_test_service();
        let task = service
            .create_task(PredictionConfig::default(), create_test_series(60))
            .await
            .unwrap();
        assert_eq!(task.task_type, TaskType::Forecasting);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(matches!(events.recv().await, Some(TaskEvent::TaskCreated { .. })));

        let result = service
            .execute_prediction(&task.task_id, None, Some(3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.horizon, 3);
        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        assert!(matches!(events.recv().await, Some(TaskEvent::TaskCompleted { .. })));

        let status = service.get_task_status(&task.task_id).await.unwrap();
        assert_eq!(status.status, TaskStatus::Completed);
        assert_eq!(status.prediction_count, 1);
        assert_eq!(status.last_outcomes.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_request_does_no_work() {
        let (service, _events) = create_test_service();
        let task = service
            .create_task(PredictionConfig::default(), create_test_series(60))
            .await
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = service
            .execute_prediction(&task.task_id, None, None, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Cancelled));
        let status = service.get_task_status(&task.task_id).await.unwrap();
        assert_eq!(status.status, TaskStatus::Pending);
        assert_eq!(status.prediction_count, 0);
    }

    #[tokio::test]
    async fn test_failed_prediction_marks_task_failed() {
        let (service, _events) = create_test_service();
        let task = service
            .create_task(PredictionConfig::default(), create_test_series(60))
            .await
            .unwrap();
        let err = service
            .execute_prediction(&task.task_id, None, Some(0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::InvalidInput(_)));
        let status = service.get_task_status(&task.task_id).await.unwrap();
        assert_eq!(status.status, TaskStatus::Failed);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_subtask_rejected() {
        let (service, _events) = create_test_service();
        let config = PredictionConfig {
            subtasks: vec!["prediction".to_string(), "deep_learning".to_string()],
            ..Default::default()
        };
        let err = service
            .create_task(config, create_test_series(60))
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::UnknownSubtaskType { .. }));
        assert!(service.list_active_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_data_aborts_creation() {
        let (service, mut events) = create_test_service();
        let err = service
            .create_task(PredictionConfig::default(), create_test_series(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::NoEligibleModels { .. } | PredictionError::InsufficientData { .. }
        ));
        assert!(matches!(events.recv().await, Some(TaskEvent::TaskFailed { .. })));
        assert!(service.list_active_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_delete_task_clears_history() {
        let (service, _events) = create_test_service();
        let task = service
            .create_task(PredictionConfig::default(), create_test_series(60))
            .await
            .unwrap();
        service
            .execute_prediction(&task.task_id, None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(service.task_results(&task.task_id, 10).len(), 1);

        service.delete_task(&task.task_id).unwrap();
        assert!(service.task_results(&task.task_id, 10).is_empty());
        assert!(service.get_task_status(&task.task_id).await.is_none());
        assert!(matches!(
            service.delete_task(&task.task_id),
            Err(PredictionError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_model_detects_shift() {
        let (service, mut events) = create_test_service();
        let config = PredictionConfig {
            strategy: EnsembleStrategy::Averaging,
            ..Default::default()
        };
        let task = service
            .create_task(config, create_test_series(60))
            .await
            .unwrap();
        let _ = events.recv().await;

        let shifted: Vec<f64> = create_test_series(60)
            .values()
            .iter()
            .map(|v| v + 500.0)
            .collect();
        let update = service
            .update_model(&task.task_id, PredictionData::from_values(&shifted))
            .await
            .unwrap();
        assert!((update.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        match events.recv().await {
            Some(TaskEvent::ModelUpdated { drift_detected, .. }) => assert!(drift_detected),
            other => panic!("unexpected event {:?}", other),
        }
        let status = service.get_task_status(&task.task_id).await.unwrap();
        assert!(status.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_service() {
        let (service, _events) = create_test_service();
        let task = service
            .create_task(PredictionConfig::default(), create_test_series(60))
            .await
            .unwrap();
        let token = CancellationToken::new();
        let before = service
            .execute_prediction(&task.task_id, None, Some(2), &token)
            .await
            .unwrap();

        let blob = service.save_model(&task.task_id).await.unwrap();
        service.load_model(&task.task_id, &blob).await.unwrap();
        let after = service
            .execute_prediction(&task.task_id, None, Some(2), &token)
            .await
            .unwrap();
        assert_eq!(before.prediction, after.prediction);
        assert_eq!(before.id, after.id);
    }
}
