//! Snapshot store implementations.
//!
//! Each resource class is persisted as one JSON document under its own key.
//! Ledgers never cache a document: every read loads it and every mutation
//! saves it before returning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use liquidgate_core::{GatewayError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for durable snapshot stores.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the document stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Replace the document stored under `key`.
    async fn save(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Load and deserialize a document.
pub async fn load_typed<T: DeserializeOwned>(store: &dyn SnapshotStore, key: &str) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| GatewayError::Storage(format!("corrupt snapshot '{}': {}", key, e))),
        None => Ok(None),
    }
}

/// Serialize and save a document.
pub async fn save_typed<T: Serialize>(store: &dyn SnapshotStore, key: &str, value: &T) -> Result<()> {
    store.save(key, serde_json::to_value(value)?).await
}

/// Load a document, writing `default` first if none exists yet.
pub async fn load_or_init<T, F>(store: &dyn SnapshotStore, key: &str, default: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if let Some(existing) = load_typed(store, key).await? {
        return Ok(existing);
    }
    let fresh = default();
    save_typed(store, key, &fresh).await?;
    info!("Initialized '{}' snapshot with defaults", key);
    Ok(fresh)
}

/// Stores each key as `.<key>.json` inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json", key))
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GatewayError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GatewayError::Storage(format!("failed to parse {}: {}", path.display(), e)))
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let storage_err =
            |path: &Path, e: std::io::Error| GatewayError::Storage(format!("failed to write {}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_err(self.dir.as_path(), e))?;

        // Write-then-rename so a crash never leaves a half-written snapshot.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&value)?)
            .await
            .map_err(|e| storage_err(tmp.as_path(), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_err(path.as_path(), e))?;

        debug!("Saved snapshot {}", path.display());
        Ok(())
    }
}

/// In-memory implementation of SnapshotStore.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    entries: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemorySnapshotStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}
