//! Dynamic model selection
//!
//! Profiles the incoming data, filters the registry by task type and
//! constraints, scores each survivor with a fit assessment and returns the
//! winner plus ranked alternatives.

mod characteristics;
mod fit;
mod registry;

pub use characteristics::{
    analyze_data_characteristics, DataCharacteristics, TrendDirection, TrendInfo,
};
pub use fit::{
    assess_model_fit, BiasVarianceTradeoff, ModelFitAssessment, ResidualAnalysis,
    StabilityMetrics,
};
pub use registry::{DataRequirement, EngineKind, ModelRegistry, ModelSpec, COMPLEXITY_SCALE};

use crate::error::{PredictionError, Result};
use crate::models::{PredictionData, Priority, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info};

const MAX_ALTERNATIVES: usize = 3;
const DEFAULT_SELECTION_HISTORY: usize = 100;

/// Limits a candidate model must respect; `None` means unconstrained
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConstraints {
    pub max_training_time_ms: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub accuracy_threshold: Option<f64>,
    pub max_complexity: Option<f64>,
    /// Size of the selected set, winner included
    pub max_models: Option<usize>,
    pub real_time: bool,
}

impl ModelConstraints {
    /// Why `spec` is rejected for the profiled data, if it is
    fn rejection(&self, spec: &ModelSpec, characteristics: &DataCharacteristics) -> Option<&'static str> {
        if self.max_training_time_ms.is_some_and(|max| spec.avg_training_time_ms > max) {
            return Some("training time");
        }
        if self.memory_limit_mb.is_some_and(|max| spec.memory_mb > max) {
            return Some("memory");
        }
        if self.accuracy_threshold.is_some_and(|min| spec.expected_accuracy < min) {
            return Some("accuracy");
        }
        if self.max_complexity.is_some_and(|max| spec.complexity > max) {
            return Some("complexity");
        }
        if characteristics.data_size < spec.min_data_points {
            return Some("data size");
        }
        if self.real_time && !spec.supports_realtime {
            return Some("real-time");
        }
        match spec.requires {
            Some(DataRequirement::Seasonality) if !characteristics.has_seasonality() => {
                Some("no seasonality")
            }
            Some(DataRequirement::Trend) if !characteristics.has_trend() => Some("no trend"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub selected_model: String,
    /// Runners-up in score order
    pub alternative_models: Vec<String>,
    pub reasoning: String,
    pub confidence: f64,
    /// Goodness of fit of the winner
    pub expected_performance: f64,
    pub assessment: ModelFitAssessment,
    pub characteristics: DataCharacteristics,
    pub fitting_time_ms: u64,
    pub selected_at: i64,
}

impl ModelSelection {
    /// Winner followed by the alternatives
    pub fn model_set(&self) -> Vec<String> {
        std::iter::once(self.selected_model.clone())
            .chain(self.alternative_models.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DynamicModelSelector {
    registry: ModelRegistry,
    history: VecDeque<ModelSelection>,
    history_limit: usize,
}

impl Default for DynamicModelSelector {
    fn default() -> Self {
        Self::new(ModelRegistry::default())
    }
}

impl DynamicModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            history: VecDeque::new(),
            history_limit: DEFAULT_SELECTION_HISTORY,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn selection_history(&self) -> &VecDeque<ModelSelection> {
        &self.history
    }

    /// Assess one registry entry against `data`
    pub fn evaluate_model_fit(&self, model_id: &str, data: &PredictionData) -> Result<ModelFitAssessment> {
        let spec = self
            .registry
            .get(model_id)
            .ok_or_else(|| PredictionError::UnsupportedAlgorithm {
                model_id: model_id.to_string(),
            })?;
        let characteristics = analyze_data_characteristics(data);
        Ok(assess_model_fit(spec, data, &characteristics))
    }

    pub fn select_optimal_model(
        &mut self,
        data: &PredictionData,
        task_type: TaskType,
        priority: Priority,
        constraints: &ModelConstraints,
    ) -> Result<ModelSelection> {
        let start = Instant::now();
        let characteristics = analyze_data_characteristics(data);
        let urgent = priority == Priority::Urgent;

        let mut scored: Vec<(f64, ModelFitAssessment)> = Vec::new();
        for spec in self.registry.candidates(task_type) {
            if let Some(reason) = constraints.rejection(spec, &characteristics) {
                debug!(model = %spec.id, reason = reason, "Candidate filtered out");
                continue;
            }
            let assessment = assess_model_fit(spec, data, &characteristics);
            scored.push((assessment.selection_score(urgent), assessment));
        }
        if scored.is_empty() {
            return Err(PredictionError::NoEligibleModels {
                task_type: task_type.to_string(),
            });
        }

        // Stable sort keeps registry order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let alternatives_allowed = constraints
            .max_models
            .map(|m| m.saturating_sub(1))
            .unwrap_or(MAX_ALTERNATIVES)
            .min(MAX_ALTERNATIVES);
        let mut ranked = scored.into_iter().map(|(_, a)| a);
        let best = ranked.next().ok_or_else(|| PredictionError::NoEligibleModels {
            task_type: task_type.to_string(),
        })?;
        let alternative_models: Vec<String> = ranked
            .take(alternatives_allowed)
            .map(|a| a.model_id)
            .collect();

        let selection = ModelSelection {
            selected_model: best.model_id.clone(),
            alternative_models,
            reasoning: selection_reason(&best, &characteristics),
            confidence: best.confidence(),
            expected_performance: best.goodness_of_fit,
            assessment: best,
            characteristics,
            fitting_time_ms: start.elapsed().as_millis() as u64,
            selected_at: chrono::Utc::now().timestamp_millis(),
        };

        info!(
            task_type = %task_type,
            selected = %selection.selected_model,
            alternatives = ?selection.alternative_models,
            confidence = selection.confidence,
            "Model selected"
        );

        self.history.push_back(selection.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        Ok(selection)
    }
}

fn selection_reason(best: &ModelFitAssessment, characteristics: &DataCharacteristics) -> String {
    let mut reasons = Vec::new();
    if best.goodness_of_fit > 0.8 {
        reasons.push("excellent goodness of fit".to_string());
    }
    if best.stability_metrics.parameter_stability > 0.7 {
        reasons.push("stable parameters".to_string());
    }
    if best.bias_variance.bias < 0.3 && best.bias_variance.variance < 0.3 {
        reasons.push("balanced bias and variance".to_string());
    }
    if characteristics.is_time_series && best.residual_analysis.autocorrelation < 0.2 {
        reasons.push("no residual autocorrelation".to_string());
    }
    if let Some(s) = characteristics.seasonality.filter(|s| s.detected) {
        reasons.push(format!("seasonality with period {}", s.period));
    }
    if reasons.is_empty() {
        "best overall assessment".to_string()
    } else {
        reasons.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal_series(n: usize) -> PredictionData {
        let values: Vec<f64> = (0..n)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 30.0).sin())
            .collect();
        PredictionData::from_values(&values)
    }

    #[test]
    fn test_forecasting_selection_on_seasonal_data() {
        let mut selector = DynamicModelSelector::default();
        let selection = selector
            .select_optimal_model(
                &seasonal_series(120),
                TaskType::Forecasting,
                Priority::Normal,
                &ModelConstraints::default(),
            )
            .unwrap();
        let set = selection.model_set();
        assert!(set.contains(&"holt_winters".to_string()));
        assert!(set.contains(&"exponential_smoothing".to_string()));
        assert!(selection.confidence >= 0.0 && selection.confidence <= 1.0);
        assert!(selection.reasoning.contains("period 30"));
        assert_eq!(selector.selection_history().len(), 1);
    }

    #[test]
    fn test_seasonal_model_needs_seasonality() {
        let mut selector = DynamicModelSelector::default();
        let flat = PredictionData::from_values(&[5.0; 60]);
        let selection = selector
            .select_optimal_model(
                &flat,
                TaskType::Forecasting,
                Priority::Normal,
                &ModelConstraints::default(),
            )
            .unwrap();
        assert!(!selection.model_set().contains(&"holt_winters".to_string()));
    }

    #[test]
    fn test_constraints_filter_everything() {
        let mut selector = DynamicModelSelector::default();
        let constraints = ModelConstraints {
            accuracy_threshold: Some(0.99),
            ..Default::default()
        };
        let err = selector
            .select_optimal_model(
                &seasonal_series(60),
                TaskType::AnomalyDetection,
                Priority::Normal,
                &constraints,
            )
            .unwrap_err();
        assert!(matches!(err, PredictionError::NoEligibleModels { .. }));
        assert!(selector.selection_history().is_empty());
    }

    #[test]
    fn test_real_time_and_max_models() {
        let mut selector = DynamicModelSelector::default();
        let constraints = ModelConstraints {
            real_time: true,
            max_models: Some(1),
            ..Default::default()
        };
        let selection = selector
            .select_optimal_model(
                &seasonal_series(60),
                TaskType::Regression,
                Priority::Normal,
                &constraints,
            )
            .unwrap();
        assert_eq!(selection.selected_model, "linear_regression");
        assert!(selection.alternative_models.is_empty());
    }

    #[test]
    fn test_ties_keep_registry_order() {
        let mut registry = ModelRegistry::empty();
        let base = ModelRegistry::default()
            .get("statistical_zscore")
            .unwrap()
            .clone();
        registry.register(ModelSpec {
            id: "first".to_string(),
            ..base.clone()
        });
        registry.register(ModelSpec {
            id: "second".to_string(),
            ..base
        });
        let mut selector = DynamicModelSelector::new(registry);
        let selection = selector
            .select_optimal_model(
                &seasonal_series(40),
                TaskType::AnomalyDetection,
                Priority::High,
                &ModelConstraints::default(),
            )
            .unwrap();
        assert_eq!(selection.selected_model, "first");
        assert_eq!(selection.alternative_models, vec!["second".to_string()]);
    }

    #[test]
    fn test_evaluate_unknown_model() {
        let selector = DynamicModelSelector::default();
        assert!(matches!(
            selector.evaluate_model_fit("svr", &seasonal_series(40)),
            Err(PredictionError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut selector = DynamicModelSelector::default().with_history_limit(2);
        let data = seasonal_series(40);
        for _ in 0..5 {
            selector
                .select_optimal_model(
                    &data,
                    TaskType::AnomalyDetection,
                    Priority::Low,
                    &ModelConstraints::default(),
                )
                .unwrap();
        }
        assert_eq!(selector.selection_history().len(), 2);
    }
}
