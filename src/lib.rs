//! # Tabguard
//!
//! **Per-page site lock enforcement.**
//!
//! Tabguard decides whether the page currently loaded for a host must be
//! blocked behind a password surface, keeps that surface in place against
//! page-script tampering, verifies the password with PBKDF2-HMAC-SHA256
//! under a retry throttle, and lifts the lock for a session or a fixed
//! duration before re-locking on expiry.
//!
//! ## Features
//!
//! - **Wildcard host patterns**: `*.example.com` covers subdomains and the apex
//! - **Stateless reconciliation**: every trigger re-reads the shared store
//! - **Throttled verification**: 3 failures start a 15 s cooldown with no KDF work
//! - **Temporary and session unlocks**: relock timer fires at expiry
//! - **Tamper repair**: the overlay is re-mounted and restyled within a frame
//! - **Modal focus trap**: focus cannot escape to the page while locked
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabguard::store::memory::MemoryStore;
//! use tabguard::{Collaborators, EngineConfig, Enforcer, PageHost, PageSurface};
//!
//! async fn enforce(surface: Arc<dyn PageSurface>) -> Result<(), tabguard::LockError> {
//!     let store = Arc::new(MemoryStore::new());
//!     let page = PageHost::from_url("https://shop.example.com/cart")
//!         .ok_or_else(|| tabguard::LockError::InvalidPattern("page".into()))?;
//!
//!     let engine = Enforcer::new(page, EngineConfig::default(), Collaborators::new(store, surface))?;
//!     engine.start().await;
//!     println!("status: {:?}", engine.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Tabguard protects against:
//! - **Casual access**: the page is unusable until the password is entered
//! - **Brute force from the surface**: the throttle disables input and skips the KDF
//! - **DOM tampering**: removing, re-parenting or restyling the overlay is repaired
//!
//! Tabguard does **not** defend against a user who can edit the shared
//! store or disable the host context. It gates access, it does not encrypt
//! page content.

#![deny(warnings)]
#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Host matching
pub mod host;

// Credential layer
pub mod crypto;

// Storage layer
pub mod store;

// Protocol layer
pub mod protocol;

// Overlay layer
pub mod guard;

// Engine (main public API)
pub mod engine;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use engine::events::PageEvent;
pub use engine::instance::InstanceSlot;
pub use engine::{AttemptOutcome, Collaborators, Enforcer, PageStatus};
pub use errors::LockError;
pub use guard::surface::PageSurface;
pub use host::page::PageHost;
pub use store::StateStore;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
