//! Credential verification primitives.

pub mod kdf;
pub mod throttle;
