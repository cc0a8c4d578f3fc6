//! Rendering collaborator: the page document as seen by the guard.
//!
//! Implementations wrap the real DOM (an isolated, style-encapsulated
//! node attached at the document root). DOM events (mutations, focus,
//! keys) are delivered back to the engine through its event queue, never
//! by calling into the engine from inside a surface method.

use crate::guard::view::{Control, OverlayView};
use crate::LockError;
use rand::RngCore;

/// Opaque handle of a node owned by the surface implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// Per-session random marker so page scripts cannot target the overlay
/// by a predictable selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardMarker {
    token: String,
}

impl GuardMarker {
    /// Generate a fresh random marker.
    pub fn random() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            token: hex::encode(bytes),
        }
    }

    /// Random token shared by both attributes.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Attribute set on the overlay node.
    pub fn overlay_attribute(&self) -> String {
        format!("data-tg-{}", self.token)
    }

    /// Attribute set on the document-hiding style node.
    pub fn style_attribute(&self) -> String {
        format!("data-tg-style-{}", self.token)
    }
}

/// Inline styles re-applied to the overlay node on every mount and repair.
pub const OVERLAY_STYLES: &[(&str, &str)] = &[
    ("position", "fixed"),
    ("inset", "0"),
    ("margin", "0"),
    ("z-index", "2147483647"),
    ("display", "flex"),
    ("align-items", "center"),
    ("justify-content", "center"),
    ("pointer-events", "auto"),
    ("touch-action", "none"),
    ("background", "#ffffff"),
    ("isolation", "isolate"),
];

/// Attributes re-applied to the overlay node alongside [`OVERLAY_STYLES`].
pub const OVERLAY_ATTRIBUTES: &[(&str, &str)] = &[
    ("role", "dialog"),
    ("aria-modal", "true"),
    ("tabindex", "-1"),
];

/// Inline style values on `<body>` that the lock overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyStyles {
    /// `overflow`
    pub overflow: String,
    /// `pointer-events`
    pub pointer_events: String,
    /// `user-select`
    pub user_select: String,
}

/// Inline style values the lock overrides, captured before locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyleSnapshot {
    /// `overflow` on the root element.
    pub html_overflow: String,
    /// Body styles; `None` when the document has no body yet.
    pub body: Option<BodyStyles>,
}

impl InlineStyleSnapshot {
    /// Styles that make the page non-interactive, shaped like `self`.
    pub fn locked(&self) -> Self {
        Self {
            html_overflow: "hidden".to_string(),
            body: self.body.as_ref().map(|_| BodyStyles {
                overflow: "hidden".to_string(),
                pointer_events: "none".to_string(),
                user_select: "none".to_string(),
            }),
        }
    }
}

/// Structural change observed in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children added or removed somewhere in the subtree.
    ChildList,
    /// An observed attribute (`style`, `class`) changed on `target`.
    Attributes {
        /// Node whose attribute changed.
        target: NodeId,
        /// Attribute name.
        attribute: String,
    },
}

/// Where a `focusin` event landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// Inside the surface; the control, if it is one of ours.
    Overlay(Option<Control>),
    /// Somewhere in the underlying page.
    Page(NodeId),
}

/// DOM operations the guard needs.
pub trait PageSurface: Send + Sync {
    /// Hide the whole document behind a marker-tagged style (anti-flash).
    fn hide_document(&self, marker: &GuardMarker);

    /// Remove the document-hiding style, if present.
    fn reveal_document(&self);

    /// Create the isolated overlay node and attach it at the document root.
    fn mount_overlay(&self, marker: &GuardMarker) -> Result<NodeId, LockError>;

    /// Re-apply [`OVERLAY_STYLES`], [`OVERLAY_ATTRIBUTES`] and the marker.
    fn apply_overlay_styles(&self, overlay: NodeId, marker: &GuardMarker);

    /// Whether the overlay is connected and a direct child of the root.
    fn is_mounted(&self, overlay: NodeId) -> bool;

    /// Detach the overlay node.
    fn detach(&self, overlay: NodeId);

    /// Project the view-model into the overlay's contents.
    fn render(&self, overlay: NodeId, view: &OverlayView);

    /// Empty the password input.
    fn clear_password(&self, overlay: NodeId);

    /// Read the inline styles the lock overrides.
    fn read_inline_styles(&self) -> InlineStyleSnapshot;

    /// Write inline styles back.
    fn write_inline_styles(&self, styles: &InlineStyleSnapshot);

    /// Start observing subtree and overlay attribute mutations.
    fn observe_mutations(&self);

    /// Stop observing mutations.
    fn disconnect_mutations(&self);

    /// Element currently holding focus in the page.
    fn active_element(&self) -> Option<NodeId>;

    /// Whether a page node is still attached to the document.
    fn is_connected(&self, node: NodeId) -> bool;

    /// Focus a node (the overlay itself or a page element).
    fn focus(&self, node: NodeId);

    /// Focus a control inside the overlay.
    fn focus_control(&self, overlay: NodeId, control: Control);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_random_and_prefixed() {
        let a = GuardMarker::random();
        let b = GuardMarker::random();
        assert_ne!(a, b);
        assert_eq!(a.token().len(), 24);
        assert!(a.overlay_attribute().starts_with("data-tg-"));
        assert!(a.style_attribute().ends_with(a.token()));
    }

    #[test]
    fn test_locked_styles_follow_body_presence() {
        let without_body = InlineStyleSnapshot::default().locked();
        assert_eq!(without_body.html_overflow, "hidden");
        assert!(without_body.body.is_none());

        let with_body = InlineStyleSnapshot {
            html_overflow: "auto".to_string(),
            body: Some(BodyStyles::default()),
        }
        .locked();
        assert_eq!(with_body.body.unwrap().pointer_events, "none");
    }
}
