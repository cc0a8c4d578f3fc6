//! Persistent key/value store collaborator.
//!
//! The engine only ever performs read-then-write with last-writer-wins on
//! the small maps it owns; the store itself is treated as an external,
//! effectively serialized service.

pub mod file;
pub mod memory;
pub mod models;
pub mod unlocks;

use crate::LockError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw key/value map exchanged with the store.
pub type StoreMap = serde_json::Map<String, serde_json::Value>;

/// Storage keys shared with the settings and popup collaborators.
pub mod keys {
    /// Locked-host set: normalized pattern → enabled.
    pub const SITE_STATES: &str = "siteStates";
    /// Sorted projection of enabled patterns (also the legacy source).
    pub const LOCKED_SITES: &str = "lockedSites";
    /// Base64 derived key of the credential record.
    pub const PASSWORD_HASH: &str = "passwordHash";
    /// Base64 salt of the credential record.
    pub const PASSWORD_SALT: &str = "passwordSalt";
    /// Iteration count of the credential record.
    pub const PASSWORD_ITERATIONS: &str = "passwordIterations";
    /// Temporary unlock table: host key → expiry (Unix ms).
    pub const TEMP_UNLOCKS: &str = "tempUnlocks";
    /// Session unlock set: host key → true.
    pub const SESSION_UNLOCKS: &str = "sessionUnlocks";

    /// Keys whose change triggers a reconciliation pass.
    pub const WATCH_KEYS: &[&str] = &[
        LOCKED_SITES,
        SITE_STATES,
        PASSWORD_HASH,
        PASSWORD_SALT,
        PASSWORD_ITERATIONS,
        TEMP_UNLOCKS,
        SESSION_UNLOCKS,
    ];
}

/// Storage area a change notification originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Device-local area; the only one the engine reads.
    Local,
    /// Account-synced area.
    Sync,
    /// In-memory session area.
    Session,
    /// Policy-managed area.
    Managed,
}

/// Change notification delivered by the store's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageChange {
    /// Keys written or removed.
    pub keys: Vec<String>,
    /// Area the keys live in.
    pub area: StorageArea,
}

impl StorageChange {
    /// Change notification for the local area.
    pub fn local<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            area: StorageArea::Local,
        }
    }

    /// Whether this change intersects the engine's watch list.
    pub fn is_relevant(&self) -> bool {
        self.area == StorageArea::Local
            && self
                .keys
                .iter()
                .any(|key| keys::WATCH_KEYS.contains(&key.as_str()))
    }
}

/// Asynchronous key/value store.
///
/// Implementations should report failures through
/// [`LockError::from_store_failure`] so invalidated contexts are recognized.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the given keys; absent keys are omitted from the result.
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, LockError>;

    /// Write all entries.
    async fn set(&self, entries: StoreMap) -> Result<(), LockError>;

    /// Delete the given keys.
    async fn remove(&self, keys: &[&str]) -> Result<(), LockError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_relevance() {
        assert!(StorageChange::local(["tempUnlocks"]).is_relevant());
        assert!(StorageChange::local(["firstRun", "siteStates"]).is_relevant());
        assert!(!StorageChange::local(["firstRun"]).is_relevant());
    }

    #[test]
    fn test_change_in_other_area_is_ignored() {
        let change = StorageChange {
            keys: vec!["siteStates".to_string()],
            area: StorageArea::Sync,
        };
        assert!(!change.is_relevant());
    }

    #[test]
    fn test_change_deserializes_from_feed() {
        let change: StorageChange =
            serde_json::from_str(r#"{"keys":["passwordHash"],"area":"local"}"#).unwrap();
        assert!(change.is_relevant());
    }
}
