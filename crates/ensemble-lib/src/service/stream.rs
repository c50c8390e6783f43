//! Per-stream real-time predictors

use crate::error::{PredictionError, Result};
use crate::models::{PredictionData, PredictionResult};
use crate::predictor::{Predictor, TimeSeriesEngine, TimeSeriesParams};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

const STREAM_MODEL_VERSION: &str = "1.0.0";

/// Latest window of a live series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStream {
    pub stream_id: String,
    pub data: PredictionData,
    /// Upstream quality score in [0, 1], passed through untouched
    #[serde(default)]
    pub quality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingPrediction {
    pub stream_id: String,
    pub predictor_id: String,
    pub prediction: f64,
    pub confidence: f64,
    pub result: PredictionResult,
    pub processing_time_us: u64,
    pub data_quality: Option<f64>,
    pub model_version: String,
    pub timestamp: i64,
}

/// One lazily trained predictor per stream id
#[derive(Debug)]
pub(crate) struct StreamPredictors {
    predictors: DashMap<String, Arc<Mutex<TimeSeriesEngine>>>,
    max_window: usize,
}

impl StreamPredictors {
    pub fn new(max_window: usize) -> Self {
        Self {
            predictors: DashMap::new(),
            max_window: max_window.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn remove(&self, stream_id: &str) -> bool {
        self.predictors.remove(stream_id).is_some()
    }

    /// Existing predictor for the stream, or one trained on this window
    fn predictor_for(&self, stream: &DataStream) -> Result<Arc<Mutex<TimeSeriesEngine>>> {
        if let Some(existing) = self.predictors.get(&stream.stream_id) {
            return Ok(Arc::clone(existing.value()));
        }

        let n = stream.data.len();
        if n < 2 {
            return Err(PredictionError::insufficient_data(
                format!("realtime_{}", stream.stream_id),
                2,
                n,
            ));
        }
        let params = TimeSeriesParams {
            window_size: self.max_window.min(n - 1),
            alpha: 0.3,
            beta: 0.1,
            ..TimeSeriesParams::default()
        };
        let mut engine =
            TimeSeriesEngine::with_params(format!("realtime_{}", stream.stream_id), params);
        engine.train(&stream.data)?;
        info!(
            stream_id = %stream.stream_id,
            window = params.window_size,
            "Created stream predictor"
        );

        // A concurrent first request may have inserted already; keep theirs
        let entry = self
            .predictors
            .entry(stream.stream_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(engine)));
        Ok(Arc::clone(entry.value()))
    }

    pub async fn predict(&self, stream: &DataStream) -> Result<StreamingPrediction> {
        let start = Instant::now();
        stream.data.validate()?;
        let predictor = self.predictor_for(stream)?;
        let engine = predictor.lock().await;
        let result = engine.predict(&stream.data, 1)?;
        let processing_time_us = start.elapsed().as_micros() as u64;

        debug!(
            stream_id = %stream.stream_id,
            duration_us = processing_time_us,
            "Stream prediction"
        );

        Ok(StreamingPrediction {
            stream_id: stream.stream_id.clone(),
            predictor_id: engine.model_id().to_string(),
            prediction: result.prediction.first().unwrap_or(0.0),
            confidence: result.confidence,
            result,
            processing_time_us,
            data_quality: stream.quality,
            model_version: STREAM_MODEL_VERSION.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}
