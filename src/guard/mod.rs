//! Overlay Guard: keeps the blocking surface mounted, on top, and modal.
//!
//! The guard owns the view-model, the interaction-lock snapshot and the
//! bookkeeping for tamper repair and the focus trap. Every DOM touch goes
//! through [`PageSurface`].

pub mod surface;
#[cfg(any(test, feature = "test-seams"))]
pub mod testing;
pub mod view;

use crate::config::EngineConfig;
use crate::crypto::kdf::CredentialRecord;
use crate::guard::surface::{GuardMarker, InlineStyleSnapshot, MutationRecord, NodeId, PageSurface};
use crate::guard::view::{Control, OverlayView};
use crate::LockError;

/// Result of [`OverlayGuard::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A new overlay node was attached.
    Mounted,
    /// The existing overlay was intact; styles were re-applied.
    Intact,
}

/// Focus move requested by the focus trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRedirect {
    /// Focus a control inside the overlay.
    Control(NodeId, Control),
    /// Focus the overlay node itself.
    Overlay(NodeId),
}

/// Captured page state while interaction is locked.
#[derive(Debug, Clone)]
struct InteractionLock {
    styles: InlineStyleSnapshot,
    previous_focus: Option<NodeId>,
}

/// Blocking-surface state for one page.
#[derive(Debug)]
pub struct OverlayGuard {
    marker: GuardMarker,
    overlay: Option<NodeId>,
    view: Option<OverlayView>,
    view_credential: Option<CredentialRecord>,
    interaction: Option<InteractionLock>,
    document_hidden: bool,
    observing: bool,
    repair_scheduled: bool,
    focus_redirect_pending: bool,
}

impl OverlayGuard {
    /// Guard with a fresh random marker.
    pub fn new() -> Self {
        Self::with_marker(GuardMarker::random())
    }

    /// Guard with a specific marker.
    pub fn with_marker(marker: GuardMarker) -> Self {
        Self {
            marker,
            overlay: None,
            view: None,
            view_credential: None,
            interaction: None,
            document_hidden: false,
            observing: false,
            repair_scheduled: false,
            focus_redirect_pending: false,
        }
    }

    /// Marker tagging the overlay and document-hiding style.
    pub fn marker(&self) -> &GuardMarker {
        &self.marker
    }

    /// Overlay node, if one was mounted.
    pub fn overlay(&self) -> Option<NodeId> {
        self.overlay
    }

    /// Current view-model.
    pub fn view(&self) -> Option<&OverlayView> {
        self.view.as_ref()
    }

    /// Mutable view-model; call [`OverlayGuard::render`] after changing it.
    pub fn view_mut(&mut self) -> Option<&mut OverlayView> {
        self.view.as_mut()
    }

    /// Whether the overlay is attached where it belongs.
    pub fn is_mounted(&self, surface: &dyn PageSurface) -> bool {
        self.overlay.is_some_and(|node| surface.is_mounted(node))
    }

    /// Whether page interaction is currently locked.
    pub fn interaction_locked(&self) -> bool {
        self.interaction.is_some()
    }

    /// Mount the overlay if absent, otherwise re-assert its styles.
    ///
    /// The view-model survives repairs; it is rebuilt only when first
    /// locking or when the stored credential record changed. A verification
    /// made against a replaced record does not carry over.
    ///
    /// # Errors
    /// * `Surface` - the overlay node could not be created
    pub fn ensure(
        &mut self,
        surface: &dyn PageSurface,
        host: &str,
        credential: Option<&CredentialRecord>,
        config: &EngineConfig,
    ) -> Result<EnsureOutcome, LockError> {
        let rebuild_view = self.view.is_none() || self.view_credential.as_ref() != credential;
        if rebuild_view {
            self.view = Some(OverlayView::new(host, credential.is_some(), config));
            self.view_credential = credential.cloned();
        }

        self.lock_interaction(surface);

        if let Some(node) = self.overlay {
            if surface.is_mounted(node) {
                surface.apply_overlay_styles(node, &self.marker);
                if rebuild_view {
                    self.render(surface);
                    self.focus_first(surface);
                }
                return Ok(EnsureOutcome::Intact);
            }
            surface.detach(node);
            self.overlay = None;
        }

        if !self.document_hidden {
            surface.hide_document(&self.marker);
            self.document_hidden = true;
        }

        let node = surface.mount_overlay(&self.marker)?;
        surface.apply_overlay_styles(node, &self.marker);
        self.overlay = Some(node);
        self.render(surface);
        self.reveal(surface);
        self.focus_first(surface);
        Ok(EnsureOutcome::Mounted)
    }

    /// Remove the overlay and restore the page. Idempotent.
    ///
    /// Returns whether an overlay was mounted.
    pub fn remove(&mut self, surface: &dyn PageSurface) -> bool {
        let removed = match self.overlay.take() {
            Some(node) => {
                if surface.is_mounted(node) {
                    surface.detach(node);
                }
                true
            }
            None => false,
        };
        self.view = None;
        self.view_credential = None;
        self.reveal(surface);
        self.unlock_interaction(surface);
        removed
    }

    /// Project the view-model onto the mounted overlay.
    pub fn render(&self, surface: &dyn PageSurface) {
        if let (Some(node), Some(view)) = (self.overlay, self.view.as_ref()) {
            surface.render(node, view);
        }
    }

    /// Focus the first focusable control, or the overlay itself.
    pub fn focus_first(&self, surface: &dyn PageSurface) {
        if let Some(redirect) = self.first_focus_target() {
            apply_redirect(surface, redirect);
        }
    }

    /// Start the mutation observer if it is not running.
    pub fn start_observing(&mut self, surface: &dyn PageSurface) {
        if !self.observing {
            surface.observe_mutations();
            self.observing = true;
        }
    }

    /// Stop the mutation observer if it is running.
    pub fn stop_observing(&mut self, surface: &dyn PageSurface) {
        if self.observing {
            surface.disconnect_mutations();
            self.observing = false;
        }
    }

    /// Whether a batch of mutations calls for a repair pass.
    ///
    /// Any attribute change on the overlay counts, as does the overlay
    /// being gone or re-parented.
    pub fn needs_repair(&self, surface: &dyn PageSurface, records: &[MutationRecord]) -> bool {
        let Some(node) = self.overlay else {
            return true;
        };
        if !surface.is_mounted(node) {
            return true;
        }
        records.iter().any(|record| {
            matches!(record, MutationRecord::Attributes { target, .. } if *target == node)
        })
    }

    /// Claim the single pending repair slot. False if one is already queued.
    pub fn try_schedule_repair(&mut self) -> bool {
        if self.repair_scheduled {
            return false;
        }
        self.repair_scheduled = true;
        true
    }

    /// Release the repair slot.
    pub fn finish_repair(&mut self) {
        self.repair_scheduled = false;
    }

    /// Start a focus redirect back into the overlay.
    ///
    /// Returns `None` when there is nothing to trap or a redirect is
    /// already in flight.
    pub fn begin_focus_redirect(&mut self) -> Option<FocusRedirect> {
        if self.focus_redirect_pending || self.interaction.is_none() {
            return None;
        }
        let redirect = self.first_focus_target()?;
        self.focus_redirect_pending = true;
        Some(redirect)
    }

    /// Finish the in-flight focus redirect.
    pub fn end_focus_redirect(&mut self) {
        self.focus_redirect_pending = false;
    }

    fn first_focus_target(&self) -> Option<FocusRedirect> {
        let node = self.overlay?;
        let first = self
            .view
            .as_ref()
            .and_then(|view| view.focusable().first().copied());
        Some(match first {
            Some(control) => FocusRedirect::Control(node, control),
            None => FocusRedirect::Overlay(node),
        })
    }

    fn reveal(&mut self, surface: &dyn PageSurface) {
        if self.document_hidden {
            surface.reveal_document();
            self.document_hidden = false;
        }
    }

    fn lock_interaction(&mut self, surface: &dyn PageSurface) {
        let lock = self.interaction.get_or_insert_with(|| InteractionLock {
            styles: surface.read_inline_styles(),
            previous_focus: surface.active_element(),
        });
        surface.write_inline_styles(&lock.styles.locked());
    }

    fn unlock_interaction(&mut self, surface: &dyn PageSurface) {
        let Some(lock) = self.interaction.take() else {
            return;
        };
        surface.write_inline_styles(&lock.styles);
        if let Some(previous) = lock.previous_focus {
            if surface.is_connected(previous) {
                surface.focus(previous);
            }
        }
        self.focus_redirect_pending = false;
    }
}

impl Default for OverlayGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Perform a focus move on the surface.
pub fn apply_redirect(surface: &dyn PageSurface, redirect: FocusRedirect) {
    match redirect {
        FocusRedirect::Control(node, control) => surface.focus_control(node, control),
        FocusRedirect::Overlay(node) => surface.focus(node),
    }
}
