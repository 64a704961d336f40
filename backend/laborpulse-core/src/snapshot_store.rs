// src/snapshot_store.rs
use crate::labor_model::{NotClockedInRecord, Snapshot};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),
}

fn io_context<S: Into<String>>(source: std::io::Error, context: S) -> SnapshotError {
    SnapshotError::Io {
        source,
        context: context.into(),
    }
}

/// Holds the latest published snapshot. Readers get the previous complete
/// snapshot or the next one, never a partial update.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    not_clocked_in: RwLock<Option<Arc<Vec<NotClockedInRecord>>>>,
    data_file: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_file(data_file: PathBuf) -> Self {
        Self {
            data_file: Some(data_file),
            ..Self::default()
        }
    }

    /// Loads the last persisted snapshot, if any. A corrupt file is logged and ignored.
    pub async fn load_persisted(&self) -> Result<bool, SnapshotError> {
        let path = match &self.data_file {
            Some(path) if path.exists() => path,
            _ => return Ok(false),
        };

        let raw = fs::read_to_string(path)
            .map_err(|e| io_context(e, format!("Failed to read snapshot file: {:?}", path)))?;
        let snapshot: Snapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Snapshot file {:?} is unreadable: {}. Starting empty.", path, e);
                return Ok(false);
            }
        };

        info!(
            "Loaded persisted labor snapshot from {} (taken {})",
            path.display(),
            snapshot.timestamp
        );
        if let Some(records) = &snapshot.not_clocked_in {
            *self.not_clocked_in.write().await = Some(Arc::new(records.clone()));
        }
        *self.snapshot.write().await = Some(Arc::new(snapshot));
        Ok(true)
    }

    /// Replaces the current snapshot. The in-memory swap always happens; a
    /// persistence failure is returned afterwards.
    pub async fn publish(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let persisted = match &self.data_file {
            Some(path) => write_atomically(path, &snapshot),
            None => Ok(()),
        };
        *self.snapshot.write().await = Some(Arc::new(snapshot));
        persisted
    }

    pub async fn publish_not_clocked_in(&self, records: Vec<NotClockedInRecord>) {
        debug!("Publishing {} not-clocked-in employees", records.len());
        *self.not_clocked_in.write().await = Some(Arc::new(records));
    }

    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn not_clocked_in(&self) -> Option<Arc<Vec<NotClockedInRecord>>> {
        self.not_clocked_in.read().await.clone()
    }
}

fn write_atomically(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| io_context(e, format!("Failed to create data directory: {:?}", parent)))?;
    }

    let json_string = serde_json::to_string_pretty(snapshot)?;
    let tmp_path = path.with_extension("json.tmp");
    let mut file = File::create(&tmp_path)
        .map_err(|e| io_context(e, format!("Failed to create temp snapshot: {:?}", tmp_path)))?;
    file.write_all(json_string.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| io_context(e, format!("Failed to write temp snapshot: {:?}", tmp_path)))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| io_context(e, format!("Failed to replace snapshot file: {:?}", path)))?;

    debug!("Persisted labor snapshot to {}", path.display());
    Ok(())
}
