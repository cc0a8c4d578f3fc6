//! File-backed store with atomic writes.
//!
//! Keeps the whole key/value map as one JSON document under
//! `dirs::data_dir()/<namespace>/state.json`. Uses temp file + rename for
//! atomic writes.

use crate::store::{StateStore, StorageChange, StoreMap};
use crate::LockError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{broadcast, Mutex};

const STATE_FILE: &str = "state.json";
const FEED_CAPACITY: usize = 64;

/// Persistent [`StateStore`] for hosts without a browser storage area.
pub struct FileStore {
    /// Path of the state document.
    path: PathBuf,
    /// Serializes read-modify-write cycles on the document.
    lock: Mutex<()>,
    changes: broadcast::Sender<StorageChange>,
}

impl FileStore {
    /// Create a file store with the given namespace.
    ///
    /// State is stored under `dirs::data_dir()/<namespace>/`.
    pub async fn new(namespace: &str) -> Result<Self, LockError> {
        let base_dir = dirs::data_dir().ok_or_else(|| {
            LockError::from_store_failure("Could not find data directory")
        })?;
        Self::with_dir(base_dir.join(namespace)).await
    }

    /// Create a file store rooted at a specific directory.
    pub async fn with_dir(dir: PathBuf) -> Result<Self, LockError> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            LockError::from_store_failure(format!("Failed to create store dir: {}", e))
        })?;
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Ok(Self {
            path: dir.join(STATE_FILE),
            lock: Mutex::new(()),
            changes,
        })
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreMap, LockError> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreMap::new()),
            Err(e) => {
                return Err(LockError::from_store_failure(format!(
                    "Failed to read store file: {}",
                    e
                )))
            }
        };
        serde_json::from_str(&json)
            .map_err(|e| LockError::Store(format!("Failed to parse store file: {}", e)))
    }

    async fn save(&self, data: &StoreMap) -> Result<(), LockError> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| LockError::Store(format!("Failed to serialize store: {}", e)))?;

        // Write to temp file
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &json).await.map_err(|e| {
            LockError::from_store_failure(format!("Failed to write temp file: {}", e))
        })?;

        // Atomic rename
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            LockError::from_store_failure(format!("Failed to rename store file: {}", e))
        })?;

        Ok(())
    }

    fn publish(&self, keys: Vec<String>) {
        if !keys.is_empty() {
            let _ = self.changes.send(StorageChange::local(keys));
        }
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, LockError> {
        let _guard = self.lock.lock().await;
        let data = self.load().await?;
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: StoreMap) -> Result<(), LockError> {
        let changed: Vec<String> = entries.keys().cloned().collect();
        {
            let _guard = self.lock.lock().await;
            let mut data = self.load().await?;
            data.extend(entries);
            self.save(&data).await?;
        }
        self.publish(changed);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), LockError> {
        let removed: Vec<String> = {
            let _guard = self.lock.lock().await;
            let mut data = self.load().await?;
            let removed: Vec<String> = keys
                .iter()
                .filter(|key| data.remove(**key).is_some())
                .map(|key| key.to_string())
                .collect();
            if !removed.is_empty() {
                self.save(&data).await?;
            }
            removed
        };
        self.publish(removed);
        Ok(())
    }
}
