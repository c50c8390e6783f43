//! Ensemble snapshots and the storage seam for them
//!
//! A snapshot is the JSON encoding of a task's [`AdaptiveEnsemble`] with a
//! SHA-256 checksum over the ensemble payload. Where the blob lives is up
//! to the [`ModelPersistence`] implementation.

use crate::ensemble::AdaptiveEnsemble;
use crate::error::{PredictionError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub format_version: u32,
    pub task_id: String,
    /// JSON encoding of the ensemble, checksummed byte for byte
    pub ensemble: String,
    /// Hex SHA-256 of `ensemble`
    pub checksum: String,
    pub saved_at: i64,
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Serialize an ensemble into a checksummed blob
pub fn encode_snapshot(task_id: &str, ensemble: &AdaptiveEnsemble) -> Result<Vec<u8>> {
    let payload = serde_json::to_string(ensemble)?;
    let checksum = compute_checksum(payload.as_bytes());
    let snapshot = ModelSnapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        task_id: task_id.to_string(),
        ensemble: payload,
        checksum,
        saved_at: chrono::Utc::now().timestamp_millis(),
    };
    Ok(serde_json::to_vec(&snapshot)?)
}

/// Decode a blob, rejecting unknown versions, foreign tasks and checksum mismatches
pub fn decode_snapshot(task_id: &str, blob: &[u8]) -> Result<AdaptiveEnsemble> {
    let snapshot: ModelSnapshot = serde_json::from_slice(blob)?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(PredictionError::Persistence(format!(
            "unsupported snapshot version {}",
            snapshot.format_version
        )));
    }
    if snapshot.task_id != task_id {
        return Err(PredictionError::Persistence(format!(
            "snapshot belongs to task {}, not {}",
            snapshot.task_id, task_id
        )));
    }
    let computed = compute_checksum(snapshot.ensemble.as_bytes());
    if computed != snapshot.checksum {
        return Err(PredictionError::Persistence(format!(
            "checksum mismatch: expected {}, got {}",
            snapshot.checksum, computed
        )));
    }
    debug!(task_id = %task_id, checksum = %computed, "Snapshot checksum validated");
    Ok(serde_json::from_str(&snapshot.ensemble)?)
}

/// Storage for snapshot blobs, keyed by task id
pub trait ModelPersistence: Send + Sync {
    fn save(&self, task_id: &str, blob: &[u8]) -> Result<()>;

    /// `None` when nothing was saved for the task
    fn load(&self, task_id: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ModelPersistence for InMemoryPersistence {
    fn save(&self, task_id: &str, blob: &[u8]) -> Result<()> {
        self.blobs.insert(task_id.to_string(), blob.to_vec());
        Ok(())
    }

    fn load(&self, task_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(task_id).map(|b| b.value().clone()))
    }
}

/// One `<task_id>.json` file per task under a directory
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            PredictionError::Persistence(format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, task_id: &str) -> Result<PathBuf> {
        if task_id.is_empty() || task_id.contains(['/', '\\']) || task_id.starts_with('.') {
            return Err(PredictionError::InvalidInput(format!(
                "task id {:?} is not a valid file name",
                task_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", task_id)))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PredictionError {
    PredictionError::Persistence(format!("{}: {}", path.display(), e))
}

impl ModelPersistence for FilePersistence {
    fn save(&self, task_id: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(task_id)?;
        // Write to a temp file first so a crash never leaves a torn snapshot
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| io_error(&temp_path, e))?;
        file.write_all(blob).map_err(|e| io_error(&temp_path, e))?;
        file.sync_all().map_err(|e| io_error(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| io_error(&path, e))?;

        info!(task_id = %task_id, path = %path.display(), size = blob.len(), "Snapshot saved");
        Ok(())
    }

    fn load(&self, task_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(task_id)?;
        match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleStrategy;
    use crate::models::PredictionData;
    use crate::predictor::{Predictor, TimeSeriesEngine};

    fn create_test_ensemble() -> AdaptiveEnsemble {
        let mut ensemble = AdaptiveEnsemble::new("task-1", EnsembleStrategy::Weighted);
        ensemble.add_member(TimeSeriesEngine::new("ts"), 1.0);
        let values: Vec<f64> = (0..40).map(|i| 10.0 + (i % 5) as f64).collect();
        ensemble.train(&PredictionData::from_values(&values)).unwrap();
        ensemble
    }

    #[test]
    fn test_snapshot_restores_predictions() {
        let ensemble = create_test_ensemble();
        let blob = encode_snapshot("task-1", &ensemble).unwrap();
        let restored = decode_snapshot("task-1", &blob).unwrap();

        let data = PredictionData::from_values(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_eq!(
            ensemble.predict(&data, 3).unwrap(),
            restored.predict(&data, 3).unwrap()
        );
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let blob = encode_snapshot("task-1", &create_test_ensemble()).unwrap();
        let mut snapshot: ModelSnapshot = serde_json::from_slice(&blob).unwrap();
        snapshot.checksum = "0".repeat(64);
        let tampered = serde_json::to_vec(&snapshot).unwrap();
        assert!(matches!(
            decode_snapshot("task-1", &tampered),
            Err(PredictionError::Persistence(_))
        ));
    }

    #[test]
    fn test_snapshot_for_other_task_rejected() {
        let blob = encode_snapshot("task-1", &create_test_ensemble()).unwrap();
        assert!(matches!(
            decode_snapshot("task-2", &blob),
            Err(PredictionError::Persistence(_))
        ));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryPersistence::new();
        assert!(store.load("a").unwrap().is_none());
        store.save("a", b"blob").unwrap();
        assert_eq!(store.load("a").unwrap(), Some(b"blob".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();
        assert!(store.load("task-1").unwrap().is_none());
        store.save("task-1", b"{}").unwrap();
        assert_eq!(store.load("task-1").unwrap(), Some(b"{}".to_vec()));
        assert!(!dir.path().join("task-1.tmp").exists());
        assert!(store.save("../escape", b"{}").is_err());
    }
}
