//! JSON snapshots of a memory store.
//!
//! The format is versioned for sanity checks only; it is not a stable
//! interchange format.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::node::MemoryNode;
use super::scaler::MinMaxScaler;
use super::store::MemoryStore;
use super::{MemoryConfig, MemoryError, MemoryManager};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("Snapshot cannot be restored: {0}")]
    Restore(#[from] MemoryError),
}

/// Serialized memory state: the store plus a scaler fitted on its centroids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    pub saved_at: DateTime<Utc>,
    pub store: MemoryStore,
    pub scaler: Option<MinMaxScaler>,
}

impl Snapshot {
    #[must_use]
    pub fn capture(memory: &MemoryManager) -> Self {
        let store = memory.store().clone();
        let scaler = MinMaxScaler::fit(store.iter().map(MemoryNode::centroid));
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            store,
            scaler,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), nodes = self.store.len(), "Saved memory snapshot");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Self = serde_json::from_reader(reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        info!(path = %path.display(), nodes = snapshot.store.len(), "Loaded memory snapshot");
        Ok(snapshot)
    }

    /// Rebuild a manager under `config`. Stored nodes are checked against
    /// the configured dimension and trimmed to `max_messages`.
    pub fn restore(self, config: MemoryConfig) -> Result<MemoryManager, SnapshotError> {
        Ok(MemoryManager::from_store(config, self.store)?)
    }
}
