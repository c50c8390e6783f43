//! Correlation-based causal approximation
//!
//! This is not causal discovery. Each declared feature is linked to the
//! target when their Pearson correlation is strong enough, and predictions
//! are a sum of per-feature linear effects around the target mean. With a
//! zero edge threshold every correlated feature gets a term, which makes the
//! engine a plain additive linear regression.

use super::{regression_metrics, Predictor};
use crate::error::{PredictionError, Result};
use crate::models::{MetricsMap, PredictionData, PredictionResult, TrainingResult};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Minimum |correlation| for a feature to get an edge
pub const EDGE_THRESHOLD: f64 = 0.3;

const MIN_DATA_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Target,
    Feature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalNode {
    pub id: String,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalEdge {
    pub source: String,
    pub target: String,
    pub correlation: f64,
    /// `min(|correlation| * 1.5, 1)`
    pub confidence: f64,
    pub direction: EdgeDirection,
    /// Least-squares effect of one unit of the source on the target
    pub slope: f64,
    /// Mean of the source over the fitted data
    pub source_mean: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CausalGraph {
    pub nodes: Vec<CausalNode>,
    pub edges: Vec<CausalEdge>,
}

impl CausalGraph {
    pub fn edge_from(&self, source: &str) -> Option<&CausalEdge> {
        self.edges.iter().find(|e| e.source == source)
    }
}

/// A proportional change applied to one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub variable: String,
    /// Relative change, e.g. 0.1 for +10%
    pub magnitude: f64,
    /// Defaults to the fitted target mean
    #[serde(default)]
    pub baseline: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionResult {
    pub baseline: f64,
    pub counterfactual: f64,
    pub effect_size: f64,
    /// Confidence of the edge from the intervened variable, 0 without one
    pub confidence: f64,
}

/// Build the correlation graph for the declared features of `data`
pub fn identify_causal_effects(data: &PredictionData) -> CausalGraph {
    link_features(data, EDGE_THRESHOLD)
}

/// Graph with an edge for every feature whose |correlation| exceeds `min_correlation`
fn link_features(data: &PredictionData, min_correlation: f64) -> CausalGraph {
    let target_name = data.target.clone().unwrap_or_else(|| "target".to_string());
    let mut graph = CausalGraph {
        nodes: vec![CausalNode {
            id: target_name.clone(),
            node_type: NodeType::Target,
        }],
        edges: Vec::new(),
    };

    for feature in &data.features {
        graph.nodes.push(CausalNode {
            id: feature.clone(),
            node_type: NodeType::Feature,
        });

        let (xs, ys): (Vec<f64>, Vec<f64>) = data
            .feature_values(feature)
            .into_iter()
            .zip(data.values())
            .filter_map(|(x, y)| x.map(|x| (x, y)))
            .unzip();
        let correlation = stats::pearson(&xs, &ys);
        if correlation.abs() > min_correlation {
            let (slope, _) = stats::linear_fit(&xs, &ys);
            graph.edges.push(CausalEdge {
                source: feature.clone(),
                target: target_name.clone(),
                correlation,
                confidence: (correlation.abs() * 1.5).min(1.0),
                direction: if correlation > 0.0 {
                    EdgeDirection::Positive
                } else {
                    EdgeDirection::Negative
                },
                slope,
                source_mean: stats::mean(&xs),
            });
        }
    }
    graph
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalInferenceEngine {
    model_id: String,
    #[serde(default = "default_edge_threshold")]
    edge_threshold: f64,
    trained: bool,
    graph: CausalGraph,
    target_mean: f64,
    /// Share of target variance explained on the training data
    fit_r2: f64,
    history: Vec<TrainingResult>,
}

fn default_edge_threshold() -> f64 {
    EDGE_THRESHOLD
}

impl CausalInferenceEngine {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_edge_threshold(model_id, EDGE_THRESHOLD)
    }

    /// Threshold 0 keeps every correlated feature (regression mode)
    pub fn with_edge_threshold(model_id: impl Into<String>, edge_threshold: f64) -> Self {
        Self {
            model_id: model_id.into(),
            edge_threshold: edge_threshold.clamp(0.0, 1.0),
            trained: false,
            graph: CausalGraph::default(),
            target_mean: 0.0,
            fit_r2: 0.0,
            history: Vec::new(),
        }
    }

    pub fn graph(&self) -> &CausalGraph {
        &self.graph
    }

    pub fn edge_threshold(&self) -> f64 {
        self.edge_threshold
    }

    fn is_regression(&self) -> bool {
        self.edge_threshold == 0.0
    }

    /// Linear estimate for one point; missing features sit at their mean
    fn estimate(&self, point: &crate::models::PredictionDataPoint) -> f64 {
        self.target_mean
            + self
                .graph
                .edges
                .iter()
                .map(|e| {
                    let x = point.feature(&e.source).unwrap_or(e.source_mean);
                    e.slope * (x - e.source_mean)
                })
                .sum::<f64>()
    }

    pub fn simulate_intervention(&self, intervention: &Intervention) -> Result<InterventionResult> {
        if !self.trained {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        let baseline = intervention.baseline.unwrap_or(self.target_mean);
        let effect_size = baseline * intervention.magnitude;
        let confidence = self
            .graph
            .edge_from(&intervention.variable)
            .map(|e| e.confidence)
            .unwrap_or(0.0);
        Ok(InterventionResult {
            baseline,
            counterfactual: baseline + effect_size,
            effect_size,
            confidence,
        })
    }
}

impl Predictor for CausalInferenceEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn algorithm(&self) -> &'static str {
        if self.is_regression() {
            "linear_regression"
        } else {
            "correlation_causal"
        }
    }

    fn min_data_points(&self) -> usize {
        MIN_DATA_POINTS
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn training_history(&self) -> &[TrainingResult] {
        &self.history
    }

    fn train(&mut self, data: &PredictionData) -> Result<TrainingResult> {
        let start = Instant::now();
        if data.len() < MIN_DATA_POINTS {
            return Err(PredictionError::insufficient_data(
                &self.model_id,
                MIN_DATA_POINTS,
                data.len(),
            ));
        }

        let values = data.values();
        self.graph = link_features(data, self.edge_threshold);
        self.target_mean = stats::mean(&values);

        let fitted: Vec<f64> = data.points.iter().map(|p| self.estimate(p)).collect();
        let mae = stats::mae(&fitted, &values);
        let r2 = stats::r_squared(&fitted, &values);
        self.fit_r2 = r2;
        self.trained = true;

        let feature_importance: BTreeMap<String, f64> = self
            .graph
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.correlation.abs()))
            .collect();

        let mut metrics = MetricsMap::new();
        metrics.insert("mae".to_string(), mae);
        metrics.insert("r2".to_string(), r2);
        metrics.insert("edges".to_string(), self.graph.edges.len() as f64);
        metrics.insert(
            "causal_strength".to_string(),
            stats::mean(&self.graph.edges.iter().map(|e| e.confidence).collect::<Vec<_>>()),
        );

        debug!(
            model_id = %self.model_id,
            edges = self.graph.edges.len(),
            r2 = r2,
            "Built causal graph"
        );

        let result = TrainingResult {
            model_id: self.model_id.clone(),
            algorithm: self.algorithm().to_string(),
            training_score: 1.0 / (1.0 + mae),
            validation_score: r2.max(0.0),
            training_time_ms: start.elapsed().as_millis() as u64,
            feature_importance,
            metrics,
            trained_at: chrono::Utc::now().timestamp_millis(),
        };
        self.history.push(result.clone());
        Ok(result)
    }

    /// Estimate from the latest point's features, held flat over the horizon
    fn predict(&self, data: &PredictionData, horizon: usize) -> Result<PredictionResult> {
        if !self.trained {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        if horizon == 0 {
            return Err(PredictionError::InvalidInput(
                "horizon must be at least 1".to_string(),
            ));
        }
        let value = data
            .points
            .last()
            .map(|p| self.estimate(p))
            .unwrap_or(self.target_mean);
        Ok(PredictionResult::new(
            &self.model_id,
            if self.is_regression() {
                "additive_linear_regression"
            } else {
                "correlation_causal_approximation"
            },
            vec![value; horizon],
            self.fit_r2.clamp(0.05, 0.95),
            None,
        ))
    }

    /// Scores every point against its own features
    fn evaluate(&self, test_data: &PredictionData) -> Result<MetricsMap> {
        if !self.trained {
            return Err(PredictionError::not_trained(&self.model_id));
        }
        let predictions: Vec<f64> = test_data.points.iter().map(|p| self.estimate(p)).collect();
        Ok(regression_metrics(&predictions, &test_data.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataType, PredictionDataPoint};
    use std::collections::HashMap;

    fn create_test_data() -> PredictionData {
        // target = 2 * temperature + 1, noise is uncorrelated with the target
        let noise = [0.3, -0.2, 0.1, 0.4, -0.3, 0.2, -0.1, 0.0, -0.4, 0.3];
        let points = (0..10)
            .map(|i| {
                let temperature = i as f64;
                let mut features = HashMap::new();
                features.insert("temperature".to_string(), temperature);
                features.insert("noise".to_string(), noise[i]);
                PredictionDataPoint::new(i as i64, 2.0 * temperature + 1.0).with_features(features)
            })
            .collect();
        PredictionData::new(points, DataType::Tabular)
            .with_features(vec!["temperature".to_string(), "noise".to_string()])
            .with_target("load")
    }

    #[test]
    fn test_graph_links_correlated_feature_only() {
        let graph = identify_causal_effects(&create_test_data());
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.source, "temperature");
        assert_eq!(edge.target, "load");
        assert_eq!(edge.direction, EdgeDirection::Positive);
        assert!((edge.confidence - 1.0).abs() < 1e-9);
        assert!((edge.slope - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_points_missing_a_feature_are_skipped() {
        let mut data = create_test_data();
        // Corrupt targets on points that carry no temperature reading
        for i in [2, 5] {
            data.points[i].features = None;
            data.points[i].value = 1000.0;
        }
        let graph = identify_causal_effects(&data);
        let edge = graph.edge_from("temperature").unwrap();
        assert!((edge.slope - 2.0).abs() < 1e-9);
        assert!((edge.source_mean - 38.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_regression_mode_keeps_weak_features() {
        let data = create_test_data();
        let mut causal = CausalInferenceEngine::new("causal");
        let mut regression = CausalInferenceEngine::with_edge_threshold("linear", 0.0);
        causal.train(&data).unwrap();
        regression.train(&data).unwrap();

        assert_eq!(causal.graph().edges.len(), 1);
        assert_eq!(regression.graph().edges.len(), 2);
        assert!(regression.graph().edge_from("noise").is_some());
        assert_eq!(causal.algorithm(), "correlation_causal");
        assert_eq!(regression.algorithm(), "linear_regression");
        assert_eq!(
            regression.predict(&data, 1).unwrap().methodology,
            "additive_linear_regression"
        );
    }

    #[test]
    fn test_predicts_from_latest_features() {
        let mut engine = CausalInferenceEngine::new("causal");
        let data = create_test_data();
        engine.train(&data).unwrap();
        let result = engine.predict(&data, 2).unwrap();
        // Latest temperature is 9: 2 * 9 + 1
        for v in result.values() {
            assert!((v - 19.0).abs() < 1e-9);
        }
        let metrics = engine.evaluate(&data).unwrap();
        assert!(metrics["mae"] < 1e-9);
    }

    #[test]
    fn test_simulate_intervention() {
        let mut engine = CausalInferenceEngine::new("causal");
        engine.train(&create_test_data()).unwrap();
        let result = engine
            .simulate_intervention(&Intervention {
                variable: "temperature".to_string(),
                magnitude: 0.1,
                baseline: Some(50.0),
            })
            .unwrap();
        assert!((result.counterfactual - 55.0).abs() < 1e-9);
        assert!((result.effect_size - 5.0).abs() < 1e-9);
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_untrained_intervention_fails() {
        let engine = CausalInferenceEngine::new("causal");
        let intervention = Intervention {
            variable: "x".to_string(),
            magnitude: 0.5,
            baseline: None,
        };
        assert!(engine.simulate_intervention(&intervention).is_err());
    }

    #[test]
    fn test_no_features_predicts_mean() {
        let mut engine = CausalInferenceEngine::new("causal");
        let data = PredictionData::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        engine.train(&data).unwrap();
        assert_eq!(engine.predict(&data, 1).unwrap().values(), vec![3.0]);
    }
}
