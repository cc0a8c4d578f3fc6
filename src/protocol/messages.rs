//! Inbound messages from the navigation notifier and popup.
//!
//! Wire format is a JSON object tagged by `type`:
//! - `{"type": "sync"}` re-runs reconciliation
//! - `{"type": "lock-now", "host": "example.com"}` forces the lock

use crate::LockError;
use serde::{Deserialize, Serialize};

/// Message delivered to a page engine over the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    /// Re-check lock state (navigation committed, history updated).
    #[serde(alias = "pwl-sync")]
    Sync,

    /// Lock the addressed host now, discarding its unlocks.
    #[serde(alias = "pwl-lock-now")]
    LockNow {
        /// Target host; absent means the receiving page.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
}

impl InboundMessage {
    /// Build a `lock-now` message for a host.
    pub fn lock_now(host: impl Into<String>) -> Self {
        InboundMessage::LockNow {
            host: Some(host.into()),
        }
    }

    /// Parse a message from its JSON wire form.
    pub fn parse(json: &str) -> Result<Self, LockError> {
        serde_json::from_str(json)
            .map_err(|e| LockError::Messaging(format!("Unrecognized message: {}", e)))
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, LockError> {
        serde_json::to_string(self)
            .map_err(|e| LockError::Messaging(format!("Failed to serialize message: {}", e)))
    }
}
