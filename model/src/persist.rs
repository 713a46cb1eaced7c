//! Snapshot persistence for the registry.
//!
//! The whole [`RegistryState`] is written as one versioned JSON document.
//! Backends implement [`SnapshotStore`]; [`JsonFileStore`] keeps it on disk
//! and [`InMemorySnapshotStore`] keeps it in memory for tests.

use crate::registry::{Registry, RegistryState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Snapshot layout version written by this crate
pub const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot format {found} is not supported (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },
}

pub type PersistResult<T> = Result<T, PersistError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub saved_at: chrono::DateTime<chrono::Utc>,
    pub state: RegistryState,
}

impl Snapshot {
    pub fn new(state: RegistryState) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            saved_at: chrono::Utc::now(),
            state,
        }
    }

    pub fn to_json(&self) -> PersistResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and check the format version
    pub fn from_json(json: &str) -> PersistResult<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        if snapshot.format_version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedFormat {
                found: snapshot.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

/// Storage backend for registry snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot, or `None` if nothing was saved yet
    async fn load(&self) -> PersistResult<Option<Snapshot>>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &Snapshot) -> PersistResult<()>;

    fn backend_name(&self) -> &'static str;

    /// Load a registry, starting empty if nothing was saved
    async fn load_registry(&self) -> PersistResult<Registry> {
        Ok(match self.load().await? {
            Some(snapshot) => Registry::from_state(snapshot.state),
            None => Registry::new(),
        })
    }

    async fn save_registry(&self, registry: &Registry) -> PersistResult<()> {
        self.save(&Snapshot::new(registry.state().clone())).await
    }
}

/// Snapshot kept in a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> PersistResult<Option<Snapshot>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot yet");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let snapshot = Snapshot::from_json(&json)?;
        info!(path = %self.path.display(), "loaded snapshot");
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot) -> PersistResult<()> {
        let json = snapshot.to_json()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        info!(path = %self.path.display(), "saved snapshot");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json-file"
    }
}

/// Snapshot kept in memory, serialized the same way as on disk
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    slot: Mutex<Option<String>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> PersistResult<Option<Snapshot>> {
        match self.slot.lock().await.as_deref() {
            Some(json) => Ok(Some(Snapshot::from_json(json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> PersistResult<()> {
        *self.slot.lock().await = Some(snapshot.to_json()?);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
