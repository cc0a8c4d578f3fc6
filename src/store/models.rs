//! Typed views over the raw store map.
//!
//! Decoding is lenient: malformed entries are skipped rather than failing
//! the whole snapshot, since the settings UI and older versions share the
//! same keys.

use crate::config::DEFAULT_ITERATIONS;
use crate::crypto::kdf::CredentialRecord;
use crate::host::page::PageHost;
use crate::host::pattern::normalize_pattern;
use crate::store::{keys, StoreMap};
use crate::LockError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Normalized pattern → locked flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedHostSet {
    entries: BTreeMap<String, bool>,
}

impl LockedHostSet {
    /// Decode from the store, migrating the legacy pattern list.
    ///
    /// `siteStates` wins when it is an object; otherwise every entry of the
    /// legacy `lockedSites` array is treated as locked.
    pub fn from_store(map: &StoreMap) -> Self {
        let mut set = Self::default();
        if let Some(Value::Object(states)) = map.get(keys::SITE_STATES) {
            for (raw, enabled) in states {
                if let Some(pattern) = normalize_pattern(raw) {
                    let enabled = is_truthy(enabled);
                    let slot = set.entries.entry(pattern).or_insert(false);
                    *slot |= enabled;
                }
            }
            return set;
        }
        if let Some(Value::Array(legacy)) = map.get(keys::LOCKED_SITES) {
            for pattern in legacy.iter().filter_map(Value::as_str).filter_map(normalize_pattern) {
                set.entries.insert(pattern, true);
            }
        }
        set
    }

    /// Add (or re-enable) a pattern from raw user input.
    pub fn insert(&mut self, raw: &str) -> Result<String, LockError> {
        let pattern =
            normalize_pattern(raw).ok_or_else(|| LockError::InvalidPattern(raw.to_string()))?;
        self.entries.insert(pattern.clone(), true);
        Ok(pattern)
    }

    /// Toggle an existing pattern. Returns `false` if it is not present.
    pub fn set_enabled(&mut self, pattern: &str, enabled: bool) -> bool {
        match self.entries.get_mut(pattern) {
            Some(slot) => {
                *slot = enabled;
                true
            }
            None => false,
        }
    }

    /// Remove a pattern given as raw input.
    pub fn remove(&mut self, raw: &str) -> bool {
        normalize_pattern(raw)
            .map(|pattern| self.entries.remove(&pattern).is_some())
            .unwrap_or(false)
    }

    /// Whether the normalized pattern is present and locked.
    pub fn is_locked(&self, pattern: &str) -> bool {
        self.entries.get(pattern).copied().unwrap_or(false)
    }

    /// Sorted list of locked patterns (the read-optimized projection).
    pub fn locked_patterns(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    /// Whether any locked pattern covers the page.
    pub fn covers(&self, page: &PageHost) -> bool {
        page.is_locked_by(
            self.entries
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(pattern, _)| pattern.as_str()),
        )
    }

    /// Number of patterns, locked or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no patterns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store entries for the set and its regenerated projection.
    pub fn to_store_entries(&self) -> StoreMap {
        let states: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .map(|(pattern, enabled)| (pattern.clone(), Value::Bool(*enabled)))
            .collect();
        let projection: Vec<Value> = self.locked_patterns().into_iter().map(Value::String).collect();

        let mut entries = StoreMap::new();
        entries.insert(keys::SITE_STATES.to_string(), Value::Object(states));
        entries.insert(keys::LOCKED_SITES.to_string(), Value::Array(projection));
        entries
    }
}

/// Host key → temporary unlock expiry (Unix ms).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempUnlockTable {
    entries: BTreeMap<String, i64>,
}

impl TempUnlockTable {
    /// Decode from the store; non-numeric expiries are dropped.
    pub fn from_store(map: &StoreMap) -> Self {
        let mut table = Self::default();
        if let Some(Value::Object(raw)) = map.get(keys::TEMP_UNLOCKS) {
            for (host, expiry) in raw {
                let expiry = expiry
                    .as_i64()
                    .or_else(|| expiry.as_f64().map(|ms| ms as i64));
                if let Some(expiry) = expiry {
                    table.entries.insert(host.clone(), expiry);
                }
            }
        }
        table
    }

    /// Expiry for a host key.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Set the expiry for a host key.
    pub fn insert(&mut self, key: &str, expires_at: i64) {
        self.entries.insert(key.to_string(), expires_at);
    }

    /// Remove a host key. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode for the store.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(host, expiry)| (host.clone(), Value::from(*expiry)))
                .collect(),
        )
    }
}

/// Host keys unlocked for the rest of the browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUnlockSet {
    entries: BTreeMap<String, bool>,
}

impl SessionUnlockSet {
    /// Decode from the store; falsy flags are dropped.
    pub fn from_store(map: &StoreMap) -> Self {
        let mut set = Self::default();
        if let Some(Value::Object(raw)) = map.get(keys::SESSION_UNLOCKS) {
            for (host, flag) in raw {
                if is_truthy(flag) {
                    set.entries.insert(host.clone(), true);
                }
            }
        }
        set
    }

    /// Whether a host key is session-unlocked.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Mark a host key as session-unlocked.
    pub fn insert(&mut self, key: &str) {
        self.entries.insert(key.to_string(), true);
    }

    /// Remove a host key. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode for the store.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .keys()
                .map(|host| (host.clone(), Value::Bool(true)))
                .collect(),
        )
    }
}

/// Decode the credential record from its three storage keys.
///
/// Absent unless both hash and salt are non-empty strings.
pub fn credential_from_store(map: &StoreMap) -> Option<CredentialRecord> {
    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let hash = text(keys::PASSWORD_HASH)?;
    let salt = text(keys::PASSWORD_SALT)?;
    let iterations = map
        .get(keys::PASSWORD_ITERATIONS)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_ITERATIONS);
    Some(CredentialRecord {
        hash,
        salt,
        iterations,
    })
}

/// Store entries for a credential record.
pub fn credential_to_store(record: &CredentialRecord) -> StoreMap {
    let mut entries = StoreMap::new();
    entries.insert(keys::PASSWORD_HASH.to_string(), Value::String(record.hash.clone()));
    entries.insert(keys::PASSWORD_SALT.to_string(), Value::String(record.salt.clone()));
    entries.insert(keys::PASSWORD_ITERATIONS.to_string(), Value::from(record.iterations));
    entries
}

/// Point-in-time view of everything a reconciliation pass needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Locked-host set.
    pub locked_hosts: LockedHostSet,
    /// Credential record, if a password is configured.
    pub credential: Option<CredentialRecord>,
    /// Temporary unlock table.
    pub temp_unlocks: TempUnlockTable,
    /// Session unlock set.
    pub session_unlocks: SessionUnlockSet,
}

impl Snapshot {
    /// Decode a snapshot from a raw read of [`keys::WATCH_KEYS`].
    pub fn from_store(map: &StoreMap) -> Self {
        Self {
            locked_hosts: LockedHostSet::from_store(map),
            credential: credential_from_store(map),
            temp_unlocks: TempUnlockTable::from_store(map),
            session_unlocks: SessionUnlockSet::from_store(map),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
