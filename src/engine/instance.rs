//! Instance replacement.
//!
//! When the host context is reloaded a new engine starts on a page that
//! may still carry the previous one. Registering in an [`InstanceSlot`]
//! runs the predecessor's cleanup first, so only one engine ever acts on
//! a page.

use super::Enforcer;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

type Cleanup = Box<dyn FnOnce() + Send>;

static GLOBAL_SLOT: Lazy<InstanceSlot> = Lazy::new(InstanceSlot::new);

/// Holder of the currently active instance's cleanup.
pub struct InstanceSlot {
    current: Mutex<Option<(u64, Cleanup)>>,
    next_id: AtomicU64,
}

impl InstanceSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Process-wide slot for the page.
    pub fn global() -> &'static InstanceSlot {
        &GLOBAL_SLOT
    }

    /// Install a new instance, running the predecessor's cleanup.
    ///
    /// Returns the id to pass to [`InstanceSlot::release`].
    pub fn install<F>(&self, cleanup: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.current.lock().replace((id, Box::new(cleanup)));
        if let Some((previous_id, cleanup)) = previous {
            debug!(previous_id, id, "replacing engine instance");
            cleanup();
        }
        id
    }

    /// Vacate the slot if `id` still owns it. The cleanup is not run.
    pub fn release(&self, id: u64) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|(owner, _)| *owner == id) {
            *current = None;
            return true;
        }
        false
    }

    /// Whether an instance is installed.
    pub fn is_occupied(&self) -> bool {
        self.current.lock().is_some()
    }
}

impl Default for InstanceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Enforcer {
    /// Register in `slot`, tearing down any previous engine.
    pub fn register(&self, slot: &InstanceSlot) -> u64 {
        let this = self.clone();
        slot.install(move || this.teardown())
    }
}
