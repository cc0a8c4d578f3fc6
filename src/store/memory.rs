//! In-process store with a change-notification feed.

use crate::store::{StateStore, StorageChange, StoreMap};
use crate::LockError;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Capacity of the change feed before slow subscribers start lagging.
const FEED_CAPACITY: usize = 64;

/// In-memory [`StateStore`] that publishes a [`StorageChange`] per write.
pub struct MemoryStore {
    data: Mutex<StoreMap>,
    changes: broadcast::Sender<StorageChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_entries(StoreMap::new())
    }

    /// Create a store seeded with entries.
    pub fn with_entries(entries: StoreMap) -> Self {
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            data: Mutex::new(entries),
            changes,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    /// Copy of the full contents.
    pub fn dump(&self) -> StoreMap {
        self.data.lock().clone()
    }

    fn publish(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        // No subscribers is fine.
        let _ = self.changes.send(StorageChange::local(keys));
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, LockError> {
        let data = self.data.lock();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: StoreMap) -> Result<(), LockError> {
        let changed: Vec<String> = entries.keys().cloned().collect();
        self.data.lock().extend(entries);
        self.publish(changed);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), LockError> {
        let removed: Vec<String> = {
            let mut data = self.data.lock();
            keys.iter()
                .filter(|key| data.remove(**key).is_some())
                .map(|key| key.to_string())
                .collect()
        };
        self.publish(removed);
        Ok(())
    }
}
