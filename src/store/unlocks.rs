//! Read-modify-write helpers over the shared unlock tables.
//!
//! Every helper re-reads the table immediately before mutating it to keep
//! the lost-update window small; clearing an absent key is a no-op.

use crate::host::pattern::{normalize_pattern, strip_common_subdomain, WILDCARD_PREFIX};
use crate::protocol::messages::InboundMessage;
use crate::store::models::{LockedHostSet, SessionUnlockSet, Snapshot, TempUnlockTable};
use crate::store::{keys, StateStore, StoreMap};
use crate::LockError;
use serde_json::Value;

/// Fetch a fresh snapshot of every watched key.
pub async fn fetch_snapshot(store: &dyn StateStore) -> Result<Snapshot, LockError> {
    let raw = store.get(keys::WATCH_KEYS).await?;
    Ok(Snapshot::from_store(&raw))
}

/// Record a temporary unlock for `host_key` expiring at `expires_at` (Unix ms).
pub async fn set_temp_unlock(
    store: &dyn StateStore,
    host_key: &str,
    expires_at: i64,
) -> Result<(), LockError> {
    let raw = store.get(&[keys::TEMP_UNLOCKS]).await?;
    let mut table = TempUnlockTable::from_store(&raw);
    table.insert(host_key, expires_at);
    store.set(single(keys::TEMP_UNLOCKS, table.to_value())).await
}

/// Drop the temporary unlock for `host_key`. Returns whether one existed.
pub async fn clear_temp_unlock(store: &dyn StateStore, host_key: &str) -> Result<bool, LockError> {
    let raw = store.get(&[keys::TEMP_UNLOCKS]).await?;
    let mut table = TempUnlockTable::from_store(&raw);
    if !table.remove(host_key) {
        return Ok(false);
    }
    store.set(single(keys::TEMP_UNLOCKS, table.to_value())).await?;
    Ok(true)
}

/// Mark `host_key` as unlocked for the rest of the session.
pub async fn set_session_unlock(store: &dyn StateStore, host_key: &str) -> Result<(), LockError> {
    let raw = store.get(&[keys::SESSION_UNLOCKS]).await?;
    let mut set = SessionUnlockSet::from_store(&raw);
    set.insert(host_key);
    store.set(single(keys::SESSION_UNLOCKS, set.to_value())).await
}

/// Drop the session unlock for `host_key`. Returns whether one existed.
pub async fn clear_session_unlock(
    store: &dyn StateStore,
    host_key: &str,
) -> Result<bool, LockError> {
    let raw = store.get(&[keys::SESSION_UNLOCKS]).await?;
    let mut set = SessionUnlockSet::from_store(&raw);
    if !set.remove(host_key) {
        return Ok(false);
    }
    store.set(single(keys::SESSION_UNLOCKS, set.to_value())).await?;
    Ok(true)
}

/// Forget every session unlock (browser startup).
pub async fn reset_session_unlocks(store: &dyn StateStore) -> Result<(), LockError> {
    store
        .set(single(
            keys::SESSION_UNLOCKS,
            Value::Object(serde_json::Map::new()),
        ))
        .await
}

/// Lock a host immediately.
///
/// Marks the normalized host as locked (rewriting the projection), removes
/// its temporary and session unlocks, and returns the `lock-now` message
/// the caller should deliver to the affected page.
pub async fn lock_host(store: &dyn StateStore, raw_host: &str) -> Result<InboundMessage, LockError> {
    let pattern =
        normalize_pattern(raw_host).ok_or_else(|| LockError::InvalidPattern(raw_host.to_string()))?;
    let host_key = strip_common_subdomain(pattern.trim_start_matches(WILDCARD_PREFIX)).to_string();

    let raw = store
        .get(&[keys::SITE_STATES, keys::LOCKED_SITES, keys::TEMP_UNLOCKS])
        .await?;
    let mut hosts = LockedHostSet::from_store(&raw);
    hosts.insert(&pattern)?;
    let mut temp = TempUnlockTable::from_store(&raw);
    temp.remove(&host_key);

    let mut entries = hosts.to_store_entries();
    entries.insert(keys::TEMP_UNLOCKS.to_string(), temp.to_value());
    store.set(entries).await?;

    clear_session_unlock(store, &host_key).await?;
    Ok(InboundMessage::lock_now(host_key))
}

fn single(key: &str, value: Value) -> StoreMap {
    let mut entries = StoreMap::new();
    entries.insert(key.to_string(), value);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_clear_temp_unlock() {
        let store = MemoryStore::new();
        set_temp_unlock(&store, "example.com", 42).await.unwrap();
        set_temp_unlock(&store, "other.org", 7).await.unwrap();

        let snapshot = fetch_snapshot(&store).await.unwrap();
        assert_eq!(snapshot.temp_unlocks.get("example.com"), Some(42));

        assert!(clear_temp_unlock(&store, "example.com").await.unwrap());
        assert!(!clear_temp_unlock(&store, "example.com").await.unwrap());

        let snapshot = fetch_snapshot(&store).await.unwrap();
        assert_eq!(snapshot.temp_unlocks.get("example.com"), None);
        assert_eq!(snapshot.temp_unlocks.get("other.org"), Some(7));
    }

    #[tokio::test]
    async fn test_clear_absent_key_does_not_write() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe();
        assert!(!clear_session_unlock(&store, "example.com").await.unwrap());
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reset_session_unlocks() {
        let store = MemoryStore::new();
        set_session_unlock(&store, "a.com").await.unwrap();
        set_session_unlock(&store, "b.com").await.unwrap();
        reset_session_unlocks(&store).await.unwrap();
        let snapshot = fetch_snapshot(&store).await.unwrap();
        assert!(snapshot.session_unlocks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_host_clears_unlocks_and_updates_projection() {
        let store = MemoryStore::with_entries(
            json!({
                "siteStates": {"zeta.com": true},
                "tempUnlocks": {"example.com": 99, "zeta.com": 5},
                "sessionUnlocks": {"example.com": true}
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        let message = lock_host(&store, "https://www.example.com/inbox").await.unwrap();
        assert_eq!(message, InboundMessage::lock_now("example.com"));

        let snapshot = fetch_snapshot(&store).await.unwrap();
        assert_eq!(
            snapshot.locked_hosts.locked_patterns(),
            vec!["example.com".to_string(), "zeta.com".to_string()]
        );
        assert_eq!(snapshot.temp_unlocks.get("example.com"), None);
        assert_eq!(snapshot.temp_unlocks.get("zeta.com"), Some(5));
        assert!(!snapshot.session_unlocks.contains("example.com"));

        let raw = store.get(&[keys::LOCKED_SITES]).await.unwrap();
        assert_eq!(raw["lockedSites"], json!(["example.com", "zeta.com"]));
    }

    #[tokio::test]
    async fn test_lock_host_rejects_invalid_input() {
        let store = MemoryStore::new();
        let result = lock_host(&store, "  ").await;
        assert!(matches!(result, Err(LockError::InvalidPattern(_))));
    }
}
