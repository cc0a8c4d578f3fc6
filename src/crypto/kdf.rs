//! Password key derivation (PBKDF2-HMAC-SHA256) and credential records.

use crate::config::{EngineConfig, DEFAULT_ITERATIONS};
use crate::LockError;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Salt length in bytes for new credential records.
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Stored password verifier. Absent record means no password is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Base64-encoded derived key.
    pub hash: String,

    /// Base64-encoded salt.
    pub salt: String,

    /// PBKDF2 iteration count.
    pub iterations: u32,
}

impl CredentialRecord {
    /// Create a record for a new password with a fresh random salt.
    ///
    /// Uses `config.default_iterations` and enforces `config.min_iterations`.
    ///
    /// # Errors
    /// * `EmptyPassword` - password is empty after trimming
    /// * `ConfigError` - default iterations below the configured minimum
    pub fn create(password: &str, config: &EngineConfig) -> Result<Self, LockError> {
        Self::create_with_floor(password, config.default_iterations, config.min_iterations)
    }

    /// Create a record, enforcing a caller-supplied iteration floor.
    ///
    /// Surrounding whitespace is not part of the password, matching how
    /// submissions are verified.
    pub fn create_with_floor(
        password: &str,
        iterations: u32,
        min_iterations: u32,
    ) -> Result<Self, LockError> {
        let password = password.trim();
        if password.is_empty() {
            return Err(LockError::EmptyPassword);
        }
        if iterations < min_iterations {
            return Err(LockError::ConfigError(format!(
                "iterations ({iterations}) below minimum ({min_iterations})"
            )));
        }
        let salt = generate_salt();
        let hash = derive_key(password, &salt, iterations)?;
        Ok(Self {
            hash,
            salt,
            iterations,
        })
    }

    /// Iteration count, falling back to the default for legacy zero values.
    pub fn effective_iterations(&self) -> u32 {
        if self.iterations == 0 {
            DEFAULT_ITERATIONS
        } else {
            self.iterations
        }
    }
}

/// Key derivation seam, so callers can count or stub KDF invocations.
pub trait KeyDeriver: Send + Sync {
    /// Derive the base64-encoded key for `password`.
    fn derive(&self, password: &str, salt_b64: &str, iterations: u32) -> Result<String, LockError>;
}

/// Production deriver: PBKDF2-HMAC-SHA256 with 256-bit output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pbkdf2Sha256;

impl KeyDeriver for Pbkdf2Sha256 {
    fn derive(&self, password: &str, salt_b64: &str, iterations: u32) -> Result<String, LockError> {
        derive_key(password, salt_b64, iterations)
    }
}

/// Derive a base64-encoded PBKDF2-HMAC-SHA256 key.
pub fn derive_key(password: &str, salt_b64: &str, iterations: u32) -> Result<String, LockError> {
    if iterations == 0 {
        return Err(LockError::CredentialFormat(
            "iteration count cannot be zero".to_string(),
        ));
    }
    let salt = STANDARD
        .decode(salt_b64)
        .map_err(|e| LockError::CredentialFormat(format!("Invalid salt base64: {}", e)))?;

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut key);
    Ok(STANDARD.encode(key))
}

/// Verify a password against a stored record with the default deriver.
pub fn verify_password(password: &str, record: &CredentialRecord) -> Result<bool, LockError> {
    verify_with(&Pbkdf2Sha256, password, record)
}

/// Verify a password against a stored record.
///
/// The full derived value is compared in constant time.
pub fn verify_with(
    deriver: &dyn KeyDeriver,
    password: &str,
    record: &CredentialRecord,
) -> Result<bool, LockError> {
    let attempt = deriver.derive(password, &record.salt, record.effective_iterations())?;
    Ok(attempt.as_bytes().ct_eq(record.hash.as_bytes()).into())
}

/// Generate a random base64-encoded salt.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    STANDARD.encode(salt)
}
