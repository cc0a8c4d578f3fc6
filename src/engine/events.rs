//! Sequential event loop for one page.
//!
//! Host glue translates DOM, storage and messaging callbacks into
//! [`PageEvent`]s; [`Enforcer::run`] handles them one at a time on a
//! single task, so engine operations never interleave.

use super::Enforcer;
use crate::guard::surface::{FocusTarget, MutationRecord};
use crate::guard::view::DurationChoice;
use crate::protocol::messages::InboundMessage;
use crate::store::{keys, StorageChange};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Something that happened to the page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// Document loaded; run the initial reconciliation.
    Load,
    /// The shared store changed.
    StorageChanged(StorageChange),
    /// Decoded inbound message.
    Message(InboundMessage),
    /// Undecoded inbound message.
    RawMessage(String),
    /// Batch of observed mutations.
    Mutations(Vec<MutationRecord>),
    /// A `focusin` event.
    FocusIn(FocusTarget),
    /// Tab pressed inside the surface.
    TabKey {
        /// Shift held.
        shift: bool,
    },
    /// Password submitted.
    Submit(String),
    /// Custom slider moved.
    CustomMinutes(u32),
    /// Preset duration chosen.
    ChooseDuration(DurationChoice),
    /// Custom duration confirmed.
    ChooseCustomDuration,
    /// Page is going away.
    Unload,
}

impl Enforcer {
    /// Drain `events` until the channel closes or [`PageEvent::Unload`]
    /// arrives, then tear down.
    pub async fn run(self, mut events: mpsc::Receiver<PageEvent>) {
        while let Some(event) = events.recv().await {
            if !self.dispatch(event).await {
                break;
            }
        }
        self.teardown();
    }

    /// Handle one event. Returns false once the engine should stop.
    pub async fn dispatch(&self, event: PageEvent) -> bool {
        if self.is_torn_down() {
            return false;
        }
        match event {
            PageEvent::Load => self.start().await,
            PageEvent::StorageChanged(change) => self.handle_storage_change(&change).await,
            PageEvent::Message(message) => self.handle_message(message).await,
            PageEvent::RawMessage(json) => self.handle_raw_message(&json).await,
            PageEvent::Mutations(records) => self.handle_mutations(&records),
            PageEvent::FocusIn(target) => self.handle_focus_in(target),
            PageEvent::TabKey { shift } => {
                self.handle_tab_key(shift);
            }
            PageEvent::Submit(password) => match self.submit_password(&password).await {
                Ok(outcome) => debug!(host = %self.page().host(), ?outcome, "submission handled"),
                Err(e) => warn!(host = %self.page().host(), error = %e, "submission failed"),
            },
            PageEvent::CustomMinutes(minutes) => self.set_custom_minutes(minutes),
            PageEvent::ChooseDuration(choice) => {
                self.run_trigger("duration", self.choose_duration(choice))
                    .await
            }
            PageEvent::ChooseCustomDuration => {
                self.run_trigger("duration", self.choose_custom_duration())
                    .await
            }
            PageEvent::Unload => {
                self.teardown();
                return false;
            }
        }
        true
    }
}

/// Forward a store's change feed into a page's event queue.
///
/// A lagging subscriber resynchronizes with a change covering every
/// watched key. Stops when either side closes.
pub fn forward_storage_changes(
    mut feed: broadcast::Receiver<StorageChange>,
    events: mpsc::Sender<PageEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let change = match feed.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "storage feed lagged, resyncing");
                    StorageChange::local(keys::WATCH_KEYS.iter().copied())
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if events.send(PageEvent::StorageChanged(change)).await.is_err() {
                break;
            }
        }
    })
}
