//! Tabguard error types.

use thiserror::Error;

/// Error text fragments emitted by the store/messaging collaborators once the
/// hosting context has been torn down (extension reload, port closed).
const INVALIDATION_SIGNATURES: &[&str] = &[
    "extension context invalidated",
    "context invalidated",
    "message port closed",
    "access to storage is not allowed",
    "storage is not allowed from this context",
];

/// Errors that can occur while enforcing a page lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The hosting context was torn down mid-operation.
    #[error("Extension context invalidated")]
    ContextInvalidated,

    /// Transient failure talking to the persistent store.
    #[error("Store error: {0}")]
    Store(String),

    /// Transient failure on the messaging channel.
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Host pattern is empty, a comment, or otherwise unusable.
    #[error("Invalid host pattern: {0:?}")]
    InvalidPattern(String),

    /// Password input was empty.
    #[error("Password is empty")]
    EmptyPassword,

    /// Stored credential record could not be decoded.
    #[error("Malformed credential record: {0}")]
    CredentialFormat(String),

    /// Key derivation could not run to completion.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Verification attempted while the throttle is cooling down.
    #[error("Too many attempts, retry in {remaining_secs}s")]
    CoolingDown {
        /// Seconds left until attempts are accepted again.
        remaining_secs: u64,
    },

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Rendering collaborator could not complete an operation.
    #[error("Surface error: {0}")]
    Surface(String),

    /// The page engine was torn down while the operation was in flight.
    #[error("Page engine torn down")]
    TornDown,
}

impl LockError {
    /// Classify a store failure message.
    ///
    /// Known invalidation signatures map to [`LockError::ContextInvalidated`];
    /// anything else is a transient [`LockError::Store`] failure.
    pub fn from_store_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_invalidation_signature(&message) {
            LockError::ContextInvalidated
        } else {
            LockError::Store(message)
        }
    }

    /// Classify a messaging failure message.
    pub fn from_messaging_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_invalidation_signature(&message) {
            LockError::ContextInvalidated
        } else {
            LockError::Messaging(message)
        }
    }

    /// Whether this error means the hosting context is gone.
    pub fn is_context_invalidated(&self) -> bool {
        matches!(self, LockError::ContextInvalidated)
    }

    /// Benign errors are abandoned silently: no log noise, no retry.
    pub fn is_benign(&self) -> bool {
        matches!(self, LockError::ContextInvalidated | LockError::TornDown)
    }
}

/// Check error text against the known context-invalidation signatures.
pub fn is_invalidation_signature(text: &str) -> bool {
    let text = text.to_lowercase();
    INVALIDATION_SIGNATURES
        .iter()
        .any(|signature| text.contains(signature))
}
