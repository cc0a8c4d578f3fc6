//! In-memory [`PageSurface`] for tests.

use crate::guard::surface::{GuardMarker, InlineStyleSnapshot, NodeId, PageSurface};
use crate::guard::view::{Control, OverlayView};
use crate::LockError;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct FakeDocument {
    next_node: u64,
    mounted: HashSet<NodeId>,
    page_nodes: HashSet<NodeId>,
    hidden: bool,
    observing: bool,
    styles: InlineStyleSnapshot,
    active: Option<NodeId>,
    focused_node: Option<NodeId>,
    focused_control: Option<Control>,
    last_view: Option<OverlayView>,
    mounts: usize,
    detaches: usize,
    style_applications: usize,
    password_clears: usize,
    fail_mounts: bool,
}

/// Records every surface call; exposes tamper hooks.
#[derive(Debug, Default)]
pub struct FakeSurface {
    doc: Mutex<FakeDocument>,
}

impl FakeSurface {
    /// Empty document without a body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element to the underlying page.
    pub fn add_page_node(&self) -> NodeId {
        let mut doc = self.doc.lock();
        doc.next_node += 1;
        let node = NodeId(doc.next_node);
        doc.page_nodes.insert(node);
        node
    }

    /// Remove a page element from the document.
    pub fn remove_page_node(&self, node: NodeId) {
        self.doc.lock().page_nodes.remove(&node);
    }

    /// Simulate page script detaching every overlay.
    pub fn tamper_detach_overlay(&self) {
        self.doc.lock().mounted.clear();
    }

    /// Make subsequent mounts fail.
    pub fn fail_mounts(&self, fail: bool) {
        self.doc.lock().fail_mounts = fail;
    }

    /// Seed the page's inline styles.
    pub fn set_inline_styles(&self, styles: InlineStyleSnapshot) {
        self.doc.lock().styles = styles;
    }

    /// Current inline styles.
    pub fn inline_styles(&self) -> InlineStyleSnapshot {
        self.doc.lock().styles.clone()
    }

    /// Set the element holding focus.
    pub fn set_active_element(&self, node: Option<NodeId>) {
        self.doc.lock().active = node;
    }

    /// Number of overlay mounts.
    pub fn mount_count(&self) -> usize {
        self.doc.lock().mounts
    }

    /// Number of overlay detaches.
    pub fn detach_count(&self) -> usize {
        self.doc.lock().detaches
    }

    /// Number of times overlay styles were (re-)applied.
    pub fn style_applications(&self) -> usize {
        self.doc.lock().style_applications
    }

    /// Number of password-input clears.
    pub fn password_clears(&self) -> usize {
        self.doc.lock().password_clears
    }

    /// Whether any overlay is attached.
    pub fn has_overlay(&self) -> bool {
        !self.doc.lock().mounted.is_empty()
    }

    /// Whether the anti-flash style is present.
    pub fn is_document_hidden(&self) -> bool {
        self.doc.lock().hidden
    }

    /// Whether the mutation observer is running.
    pub fn is_observing(&self) -> bool {
        self.doc.lock().observing
    }

    /// Last node focused.
    pub fn focused_node(&self) -> Option<NodeId> {
        self.doc.lock().focused_node
    }

    /// Last overlay control focused, cleared by a plain node focus.
    pub fn focused_control(&self) -> Option<Control> {
        self.doc.lock().focused_control
    }

    /// Last rendered view.
    pub fn last_view(&self) -> Option<OverlayView> {
        self.doc.lock().last_view.clone()
    }
}

impl PageSurface for FakeSurface {
    fn hide_document(&self, _marker: &GuardMarker) {
        self.doc.lock().hidden = true;
    }

    fn reveal_document(&self) {
        self.doc.lock().hidden = false;
    }

    fn mount_overlay(&self, _marker: &GuardMarker) -> Result<NodeId, LockError> {
        let mut doc = self.doc.lock();
        if doc.fail_mounts {
            return Err(LockError::Surface("document root unavailable".to_string()));
        }
        doc.next_node += 1;
        let node = NodeId(doc.next_node);
        doc.mounted.insert(node);
        doc.mounts += 1;
        Ok(node)
    }

    fn apply_overlay_styles(&self, _overlay: NodeId, _marker: &GuardMarker) {
        self.doc.lock().style_applications += 1;
    }

    fn is_mounted(&self, overlay: NodeId) -> bool {
        self.doc.lock().mounted.contains(&overlay)
    }

    fn detach(&self, overlay: NodeId) {
        let mut doc = self.doc.lock();
        if doc.mounted.remove(&overlay) {
            doc.detaches += 1;
        }
    }

    fn render(&self, _overlay: NodeId, view: &OverlayView) {
        self.doc.lock().last_view = Some(view.clone());
    }

    fn clear_password(&self, _overlay: NodeId) {
        self.doc.lock().password_clears += 1;
    }

    fn read_inline_styles(&self) -> InlineStyleSnapshot {
        self.doc.lock().styles.clone()
    }

    fn write_inline_styles(&self, styles: &InlineStyleSnapshot) {
        self.doc.lock().styles = styles.clone();
    }

    fn observe_mutations(&self) {
        self.doc.lock().observing = true;
    }

    fn disconnect_mutations(&self) {
        self.doc.lock().observing = false;
    }

    fn active_element(&self) -> Option<NodeId> {
        self.doc.lock().active
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let doc = self.doc.lock();
        doc.page_nodes.contains(&node) || doc.mounted.contains(&node)
    }

    fn focus(&self, node: NodeId) {
        let mut doc = self.doc.lock();
        doc.focused_node = Some(node);
        doc.focused_control = None;
        doc.active = Some(node);
    }

    fn focus_control(&self, overlay: NodeId, control: Control) {
        let mut doc = self.doc.lock();
        doc.focused_node = Some(overlay);
        doc.focused_control = Some(control);
        doc.active = Some(overlay);
    }
}
