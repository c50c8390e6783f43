//! Task state, execution plan and lifecycle events

use crate::ensemble::{AdaptiveEnsemble, DriftDetection, EnsembleStrategy};
use crate::error::{PredictionError, Result};
use crate::models::{DataType, PredictionData, Priority, TaskType};
use crate::selector::{ModelConstraints, ModelSelection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Distinct target values at or below which tabular data is classification
const CLASSIFICATION_MAX_CLASSES: usize = 10;
/// Points required before the cardinality rule applies
const CLASSIFICATION_MIN_POINTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One step of a task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtask {
    /// Compare the input against the ensemble's drift baseline
    DriftCheck,
    Prediction,
    /// Walk-forward evaluation that feeds the adaptive weights
    Evaluation,
}

impl Subtask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DriftCheck => "drift_check",
            Self::Prediction => "prediction",
            Self::Evaluation => "evaluation",
        }
    }

    /// A failed critical subtask fails the whole execution
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Prediction)
    }
}

impl fmt::Display for Subtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subtask {
    type Err = PredictionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drift_check" => Ok(Self::DriftCheck),
            "prediction" => Ok(Self::Prediction),
            "evaluation" => Ok(Self::Evaluation),
            other => Err(PredictionError::UnknownSubtaskType {
                name: other.to_string(),
            }),
        }
    }
}

/// Parse an execution plan; it must contain a prediction step
pub fn parse_plan(names: &[String]) -> Result<Vec<Subtask>> {
    let plan = names
        .iter()
        .map(|name| name.parse())
        .collect::<Result<Vec<Subtask>>>()?;
    if !plan.contains(&Subtask::Prediction) {
        return Err(PredictionError::InvalidInput(
            "execution plan has no prediction step".to_string(),
        ));
    }
    Ok(plan)
}

fn default_subtasks() -> Vec<String> {
    vec![
        Subtask::DriftCheck.as_str().to_string(),
        Subtask::Prediction.as_str().to_string(),
        Subtask::Evaluation.as_str().to_string(),
    ]
}

/// Caller-supplied settings for a new task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the inferred task type
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub constraints: ModelConstraints,
    #[serde(default)]
    pub strategy: EnsembleStrategy,
    /// Horizon for executions that do not give one
    #[serde(default)]
    pub horizon: Option<usize>,
    #[serde(default = "default_subtasks")]
    pub subtasks: Vec<String>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            name: None,
            task_type: None,
            priority: Priority::default(),
            constraints: ModelConstraints::default(),
            strategy: EnsembleStrategy::default(),
            horizon: None,
            subtasks: default_subtasks(),
        }
    }
}

/// Forecasting for time series, classification for low-cardinality targets, else regression
pub fn infer_task_type(data: &PredictionData) -> TaskType {
    if data.data_type == DataType::Timeseries {
        return TaskType::Forecasting;
    }
    let distinct: HashSet<u64> = data.points.iter().map(|p| p.value.to_bits()).collect();
    if distinct.len() <= CLASSIFICATION_MAX_CLASSES && data.len() > CLASSIFICATION_MIN_POINTS {
        TaskType::Classification
    } else {
        TaskType::Regression
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    pub subtask: Subtask,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Returned by task creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionTask {
    pub task_id: String,
    pub name: String,
    pub task_type: TaskType,
    pub priority: Priority,
    pub description: String,
    pub status: TaskStatus,
    pub selection: ModelSelection,
    pub training_score: f64,
    pub created_at: i64,
}

/// Read-only view of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub task_id: String,
    pub name: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub models: Vec<String>,
    pub weights: Vec<f64>,
    pub created_at: i64,
    pub last_updated: Option<i64>,
    pub prediction_count: u64,
    pub last_error: Option<String>,
    pub last_outcomes: Vec<SubtaskOutcome>,
}

/// Everything a task owns; guarded by the task's mutex
#[derive(Debug)]
pub(crate) struct TaskState {
    pub task_id: String,
    pub name: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub ensemble: AdaptiveEnsemble,
    pub data: Arc<PredictionData>,
    pub selection: ModelSelection,
    pub plan: Vec<Subtask>,
    pub horizon: usize,
    pub created_at: i64,
    pub last_updated: Option<i64>,
    pub last_error: Option<String>,
    pub last_drift: Option<DriftDetection>,
    pub last_outcomes: Vec<SubtaskOutcome>,
    pub prediction_count: u64,
}

impl TaskState {
    pub fn report(&self) -> TaskStatusReport {
        TaskStatusReport {
            task_id: self.task_id.clone(),
            name: self.name.clone(),
            task_type: self.task_type,
            status: self.status,
            models: self.ensemble.engine().member_ids(),
            weights: self.ensemble.weights().to_vec(),
            created_at: self.created_at,
            last_updated: self.last_updated,
            prediction_count: self.prediction_count,
            last_error: self.last_error.clone(),
            last_outcomes: self.last_outcomes.clone(),
        }
    }

    pub fn fail(&mut self, error: &PredictionError) {
        self.status = TaskStatus::Failed;
        self.last_error = Some(error.to_string());
    }
}

/// Lifecycle notifications sent on the service's event channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated {
        task_id: String,
        task_type: TaskType,
        models: Vec<String>,
    },
    TaskCompleted {
        task_id: String,
        prediction_id: String,
        confidence: f64,
    },
    TaskFailed {
        task_id: String,
        stage: String,
        error: String,
    },
    ModelUpdated {
        task_id: String,
        drift_detected: bool,
        weight_change: f64,
    },
    TaskDeleted {
        task_id: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::ModelUpdated { task_id, .. }
            | Self::TaskDeleted { task_id } => task_id,
        }
    }
}
