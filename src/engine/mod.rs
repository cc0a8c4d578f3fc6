//! Per-page enforcement engine.
//!
//! An [`Enforcer`] owns the Page Enforcement State for one page and runs
//! the Lock State Reconciler against a fresh store snapshot on every
//! trigger. All state lives behind one mutex that is never held across an
//! await; after every await the engine re-checks that it was not torn down.

pub mod events;
pub mod instance;
mod scheduler;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::crypto::kdf::{verify_with, CredentialRecord, KeyDeriver, Pbkdf2Sha256};
use crate::crypto::throttle::{remaining_secs, FailureOutcome, Throttle, ThrottleState};
use crate::guard::surface::{FocusTarget, PageSurface};
use crate::guard::view::{
    cooldown_message, incorrect_password_message, Control, DurationChoice, OverlayMode,
    OverlayView, TabAction, EMPTY_PASSWORD_MESSAGE,
};
use crate::guard::{apply_redirect, EnsureOutcome, FocusRedirect, OverlayGuard};
use crate::host::page::PageHost;
use crate::protocol::messages::InboundMessage;
use crate::store::unlocks::{
    clear_session_unlock, clear_temp_unlock, fetch_snapshot, set_session_unlock, set_temp_unlock,
};
use crate::store::{StateStore, StorageChange};
use crate::LockError;
use parking_lot::Mutex;
use scheduler::PendingTimer;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Externally visible enforcement status of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// No surface; the page is usable.
    Unlocked,
    /// Surface mounted, waiting for credentials.
    Locked,
    /// Surface mounted, credentials verified, waiting for a duration.
    ChoosingDuration,
    /// Engine discarded; no further effects.
    TornDown,
}

/// Result of a password submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Password verified; the duration panel is shown.
    Accepted,
    /// Wrong password; more attempts remain.
    Rejected {
        /// Attempts left before the cooldown engages.
        attempts_left: u32,
    },
    /// Throttled; no verification was performed.
    CoolingDown {
        /// Seconds until attempts are accepted again.
        remaining_secs: u64,
    },
    /// Submission was empty after trimming.
    EmptyPassword,
    /// No credential record is configured.
    NotConfigured,
    /// The page is not waiting for a password.
    NotLocked,
    /// An earlier submission is still being verified; this one was dropped.
    Busy,
}

/// Collaborators an engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Shared persistent key/value store.
    pub store: Arc<dyn StateStore>,
    /// Rendering collaborator for the page document.
    pub surface: Arc<dyn PageSurface>,
    /// Wall clock for expiries and cooldowns.
    pub clock: Arc<dyn Clock>,
    /// Key derivation used to verify passwords.
    pub deriver: Arc<dyn KeyDeriver>,
}

impl Collaborators {
    /// Production collaborators: system clock and PBKDF2-SHA256.
    pub fn new(store: Arc<dyn StateStore>, surface: Arc<dyn PageSurface>) -> Self {
        Self {
            store,
            surface,
            clock: Arc::new(SystemClock),
            deriver: Arc::new(Pbkdf2Sha256),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the key deriver.
    pub fn with_deriver(mut self, deriver: Arc<dyn KeyDeriver>) -> Self {
        self.deriver = deriver;
        self
    }
}

/// Page Enforcement State.
pub(crate) struct PageState {
    lock_active: bool,
    credential: Option<CredentialRecord>,
    throttle: Throttle,
    verifying: bool,
    guard: OverlayGuard,
    relock_timer: Option<PendingTimer>,
    cooldown_ticker: Option<PendingTimer>,
    repair_task: Option<PendingTimer>,
    next_timer_id: u64,
    torn_down: bool,
}

impl PageState {
    fn status(&self) -> PageStatus {
        if self.torn_down {
            return PageStatus::TornDown;
        }
        if !self.lock_active {
            return PageStatus::Unlocked;
        }
        match self.guard.view().map(OverlayView::mode) {
            Some(OverlayMode::ChoosingDuration) => PageStatus::ChoosingDuration,
            _ => PageStatus::Locked,
        }
    }

    fn next_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }
}

struct Inner {
    page: PageHost,
    config: EngineConfig,
    deps: Collaborators,
    state: Mutex<PageState>,
}

/// Lock enforcement engine for one page.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Enforcer {
    inner: Arc<Inner>,
}

impl Enforcer {
    /// Create an engine for a page.
    ///
    /// # Errors
    /// * `ConfigError` - configuration failed validation
    pub fn new(
        page: PageHost,
        config: EngineConfig,
        deps: Collaborators,
    ) -> Result<Self, LockError> {
        config.validate()?;
        let state = PageState {
            lock_active: false,
            credential: None,
            throttle: Throttle::new(config.max_attempts, config.cooldown_millis()),
            verifying: false,
            guard: OverlayGuard::new(),
            relock_timer: None,
            cooldown_ticker: None,
            repair_task: None,
            next_timer_id: 0,
            torn_down: false,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                page,
                config,
                deps,
                state: Mutex::new(state),
            }),
        })
    }

    /// Page this engine enforces.
    pub fn page(&self) -> &PageHost {
        &self.inner.page
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Current status.
    pub fn status(&self) -> PageStatus {
        self.inner.state.lock().status()
    }

    /// Consecutive failed verifications since the last success or reset.
    pub fn failed_attempts(&self) -> u32 {
        self.inner.state.lock().throttle.failed_attempts()
    }

    /// Copy of the current view-model, if the surface is up.
    pub fn view(&self) -> Option<OverlayView> {
        self.inner.state.lock().guard.view().cloned()
    }

    /// Whether [`Enforcer::teardown`] ran.
    pub fn is_torn_down(&self) -> bool {
        self.inner.state.lock().torn_down
    }

    fn store(&self) -> &dyn StateStore {
        self.inner.deps.store.as_ref()
    }

    fn surface(&self) -> &dyn PageSurface {
        self.inner.deps.surface.as_ref()
    }

    fn now_millis(&self) -> i64 {
        self.inner.deps.clock.now_millis()
    }

    fn ensure_live(&self) -> Result<(), LockError> {
        if self.inner.state.lock().torn_down {
            return Err(LockError::TornDown);
        }
        Ok(())
    }

    // Triggers. These never propagate errors.

    /// Initial reconciliation on page load.
    pub async fn start(&self) {
        self.run_trigger("load", self.reconcile()).await;
    }

    /// Reconcile after a store change if it touches a watched key.
    pub async fn handle_storage_change(&self, change: &StorageChange) {
        if !change.is_relevant() {
            return;
        }
        self.run_trigger("storage", self.reconcile()).await;
    }

    /// Act on an inbound message.
    pub async fn handle_message(&self, message: InboundMessage) {
        match message {
            InboundMessage::Sync => self.run_trigger("sync", self.reconcile()).await,
            InboundMessage::LockNow { host } => {
                self.run_trigger("lock-now", self.force_lock(host.as_deref()))
                    .await
            }
        }
    }

    /// Parse and act on a raw JSON message; unknown messages are ignored.
    pub async fn handle_raw_message(&self, json: &str) {
        match InboundMessage::parse(json) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => debug!(host = %self.page().host(), error = %e, "ignoring message"),
        }
    }

    pub(crate) async fn run_trigger<F>(&self, trigger: &'static str, operation: F)
    where
        F: Future<Output = Result<PageStatus, LockError>>,
    {
        match operation.await {
            Ok(status) => debug!(host = %self.page().host(), trigger, ?status, "trigger handled"),
            Err(e) if e.is_benign() => {
                debug!(host = %self.page().host(), trigger, error = %e, "trigger abandoned")
            }
            Err(e) => warn!(host = %self.page().host(), trigger, error = %e, "trigger failed"),
        }
    }

    // Lock State Reconciler.

    /// Bring the page in line with the persisted configuration.
    ///
    /// Idempotent: a second run with an unchanged store changes nothing.
    ///
    /// # Errors
    /// * `TornDown` - the engine was torn down
    /// * `Store` / `ContextInvalidated` - the store could not be read or
    ///   the expired entry could not be written back
    /// * `Surface` - the overlay could not be mounted
    pub async fn reconcile(&self) -> Result<PageStatus, LockError> {
        self.ensure_live()?;
        self.cancel_relock();

        let snapshot = fetch_snapshot(self.store()).await?;
        self.ensure_live()?;

        let key = self.page().key();
        if !snapshot.locked_hosts.covers(self.page()) {
            debug!(host = %self.page().host(), "not a locked host");
            return self.apply_unlocked(snapshot.credential);
        }
        if snapshot.session_unlocks.contains(key) {
            debug!(host = %self.page().host(), "session unlock present");
            return self.apply_unlocked(snapshot.credential);
        }
        if let Some(expires_at) = snapshot.temp_unlocks.get(key) {
            if expires_at > self.now_millis() {
                debug!(host = %self.page().host(), expires_at, "temporary unlock active");
                let status = self.apply_unlocked(snapshot.credential)?;
                self.arm_relock(expires_at);
                return Ok(status);
            }
            debug!(host = %self.page().host(), expires_at, "temporary unlock expired");
            clear_temp_unlock(self.store(), key).await?;
            self.ensure_live()?;
        }
        self.apply_locked(snapshot.credential)
    }

    /// Lock the page now if `target` addresses it, discarding its unlocks.
    ///
    /// # Errors
    /// * `TornDown` - the engine was torn down
    /// * `Store` / `ContextInvalidated` - the unlock tables could not be updated
    /// * `Surface` - the overlay could not be mounted
    pub async fn force_lock(&self, target: Option<&str>) -> Result<PageStatus, LockError> {
        self.ensure_live()?;
        if !self.page().is_targeted_by(target) {
            debug!(host = %self.page().host(), ?target, "lock-now for another host");
            return Ok(self.status());
        }
        self.cancel_relock();

        let key = self.page().key();
        clear_temp_unlock(self.store(), key).await?;
        clear_session_unlock(self.store(), key).await?;
        let snapshot = fetch_snapshot(self.store()).await?;
        self.ensure_live()?;

        info!(host = %self.page().host(), "forced lock");
        self.apply_locked(snapshot.credential)
    }

    fn apply_unlocked(&self, credential: Option<CredentialRecord>) -> Result<PageStatus, LockError> {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if st.torn_down {
            return Err(LockError::TornDown);
        }
        st.credential = credential;
        let was_locked = st.lock_active;
        st.lock_active = false;
        if let Some(task) = st.repair_task.take() {
            task.cancel();
        }
        st.guard.finish_repair();
        st.guard.stop_observing(self.surface());
        st.guard.remove(self.surface());
        if was_locked {
            info!(host = %self.page().host(), "page unlocked");
        }
        Ok(st.status())
    }

    fn apply_locked(&self, credential: Option<CredentialRecord>) -> Result<PageStatus, LockError> {
        let now = self.now_millis();
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if st.torn_down {
            return Err(LockError::TornDown);
        }
        let configured = credential.is_some();
        st.credential = credential;
        let was_locked = st.lock_active;
        st.lock_active = true;

        st.guard.start_observing(self.surface());
        let outcome = st.guard.ensure(
            self.surface(),
            self.page().host(),
            st.credential.as_ref(),
            &self.inner.config,
        )?;

        if let ThrottleState::Cooling { until_ms } = st.throttle.state(now) {
            if let Some(view) = st.guard.view_mut() {
                if view.mode() == OverlayMode::Password && !view.is_disabled() {
                    view.set_disabled(true);
                    view.set_error(cooldown_message(remaining_secs(until_ms, now)));
                    st.guard.render(self.surface());
                }
            }
            if st.cooldown_ticker.is_none() {
                self.start_cooldown_ticker(st);
            }
        }

        if !was_locked {
            info!(host = %self.page().host(), configured, "page locked");
        } else if outcome == EnsureOutcome::Mounted {
            info!(host = %self.page().host(), "overlay re-mounted");
        }
        Ok(st.status())
    }

    // Unlock flow.

    /// Verify a password typed into the surface.
    ///
    /// Cooldown and empty input are answered without running the KDF. Only
    /// one submission is verified at a time; overlapping ones get
    /// [`AttemptOutcome::Busy`], so the throttle bounds derivations.
    ///
    /// # Errors
    /// * `TornDown` - the engine was torn down
    /// * `KeyDerivation` - the derivation task did not complete
    /// * `CredentialFormat` - the stored salt is not valid base64
    pub async fn submit_password(&self, password: &str) -> Result<AttemptOutcome, LockError> {
        let record = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            if st.torn_down {
                return Err(LockError::TornDown);
            }
            if !st.lock_active {
                return Ok(AttemptOutcome::NotLocked);
            }
            let Some(record) = st.credential.clone() else {
                return Ok(AttemptOutcome::NotConfigured);
            };
            if st.guard.view().map(OverlayView::mode) != Some(OverlayMode::Password) {
                return Ok(AttemptOutcome::NotLocked);
            }
            if st.verifying {
                return Ok(AttemptOutcome::Busy);
            }

            if let Err(LockError::CoolingDown { remaining_secs }) =
                st.throttle.admit(self.now_millis())
            {
                if let Some(view) = st.guard.view_mut() {
                    view.set_disabled(true);
                    view.set_error(cooldown_message(remaining_secs));
                }
                st.guard.render(self.surface());
                return Ok(AttemptOutcome::CoolingDown { remaining_secs });
            }

            if password.trim().is_empty() {
                if let Some(view) = st.guard.view_mut() {
                    view.set_error(EMPTY_PASSWORD_MESSAGE);
                }
                st.guard.render(self.surface());
                return Ok(AttemptOutcome::EmptyPassword);
            }
            st.verifying = true;
            record
        };

        let deriver = Arc::clone(&self.inner.deps.deriver);
        let attempt = password.trim().to_string();
        let result = tokio::task::spawn_blocking(move || {
            verify_with(deriver.as_ref(), &attempt, &record)
        })
        .await;

        let now = self.now_millis();
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        st.verifying = false;
        if st.torn_down {
            return Err(LockError::TornDown);
        }
        let verified = result
            .map_err(|e| LockError::KeyDerivation(format!("Verification task failed: {}", e)))??;
        if !st.lock_active {
            return Ok(AttemptOutcome::NotLocked);
        }

        if verified {
            st.throttle.record_success();
            if let Some(ticker) = st.cooldown_ticker.take() {
                ticker.cancel();
            }
            if let Some(view) = st.guard.view_mut() {
                view.show_duration_options();
            }
            st.guard.render(self.surface());
            st.guard.focus_first(self.surface());
            info!(host = %self.page().host(), "password accepted");
            return Ok(AttemptOutcome::Accepted);
        }

        if let Some(overlay) = st.guard.overlay() {
            self.surface().clear_password(overlay);
        }
        match st.throttle.record_failure(now) {
            FailureOutcome::AttemptsLeft(attempts_left) => {
                if let Some(view) = st.guard.view_mut() {
                    view.set_error(incorrect_password_message(attempts_left));
                }
                st.guard.render(self.surface());
                st.guard.focus_first(self.surface());
                debug!(host = %self.page().host(), attempts_left, "password rejected");
                Ok(AttemptOutcome::Rejected { attempts_left })
            }
            FailureOutcome::CoolingDown { until_ms } => {
                let remaining_secs = remaining_secs(until_ms, now);
                if let Some(view) = st.guard.view_mut() {
                    view.set_disabled(true);
                    view.set_error(cooldown_message(remaining_secs));
                }
                st.guard.render(self.surface());
                self.start_cooldown_ticker(st);
                info!(
                    host = %self.page().host(),
                    attempts = st.throttle.failed_attempts(),
                    remaining_secs,
                    "too many attempts, cooling down"
                );
                Ok(AttemptOutcome::CoolingDown { remaining_secs })
            }
        }
    }

    /// Unlock for the chosen duration. Only valid after verification.
    ///
    /// # Errors
    /// * `TornDown` - the engine was torn down
    /// * `Store` / `ContextInvalidated` - the unlock could not be recorded
    pub async fn choose_duration(&self, choice: DurationChoice) -> Result<PageStatus, LockError> {
        {
            let st = self.inner.state.lock();
            if st.torn_down {
                return Err(LockError::TornDown);
            }
            if st.status() != PageStatus::ChoosingDuration {
                debug!(host = %self.page().host(), "duration chosen without verification");
                return Ok(st.status());
            }
        }

        let key = self.page().key();
        match choice {
            DurationChoice::Session => {
                set_session_unlock(self.store(), key).await?;
                info!(host = %self.page().host(), "unlocked for session");
                self.apply_unlocked(self.current_credential())
            }
            DurationChoice::Minutes(minutes) => {
                let expires_at = self.now_millis() + i64::from(minutes.max(1)) * 60_000;
                set_temp_unlock(self.store(), key, expires_at).await?;
                info!(host = %self.page().host(), minutes, expires_at, "unlocked temporarily");
                self.apply_unlocked(self.current_credential())?;
                self.schedule_relock(expires_at).await
            }
        }
    }

    /// Unlock for the custom duration currently shown on the slider.
    ///
    /// # Errors
    /// Same as [`Enforcer::choose_duration`].
    pub async fn choose_custom_duration(&self) -> Result<PageStatus, LockError> {
        let minutes = self
            .inner
            .state
            .lock()
            .guard
            .view()
            .map(OverlayView::custom_minutes)
            .unwrap_or(self.inner.config.default_custom_minutes);
        self.choose_duration(DurationChoice::Minutes(minutes)).await
    }

    /// Move the custom-duration slider.
    pub fn set_custom_minutes(&self, minutes: u32) {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if let Some(view) = st.guard.view_mut() {
            view.set_custom_minutes(minutes);
            st.guard.render(self.surface());
        }
    }

    fn current_credential(&self) -> Option<CredentialRecord> {
        self.inner.state.lock().credential.clone()
    }

    // Overlay guard events.

    /// React to a focus change while locked.
    ///
    /// Focus landing in the page is pulled back into the surface; focus
    /// inside the surface is remembered for tab cycling.
    pub fn handle_focus_in(&self, target: FocusTarget) {
        let redirect = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            if st.torn_down || !st.lock_active {
                return;
            }
            match target {
                FocusTarget::Overlay(control) => {
                    if let (Some(control), Some(view)) = (control, st.guard.view_mut()) {
                        view.note_focus(control);
                    }
                    return;
                }
                FocusTarget::Page(_) => st.guard.begin_focus_redirect(),
            }
        };
        let Some(redirect) = redirect else {
            return;
        };
        apply_redirect(self.surface(), redirect);
        self.inner.state.lock().guard.end_focus_redirect();
    }

    /// Handle Tab / Shift+Tab inside the surface.
    pub fn handle_tab_key(&self, shift: bool) -> TabAction {
        let (action, overlay) = {
            let st = self.inner.state.lock();
            if st.torn_down || !st.lock_active {
                return TabAction::Default;
            }
            let (Some(overlay), Some(view)) = (st.guard.overlay(), st.guard.view()) else {
                return TabAction::Default;
            };
            (view.tab(shift), overlay)
        };
        match action {
            TabAction::Focus(control) => {
                apply_redirect(self.surface(), FocusRedirect::Control(overlay, control));
                self.note_focus(control);
            }
            TabAction::FocusOverlay => {
                apply_redirect(self.surface(), FocusRedirect::Overlay(overlay))
            }
            TabAction::Default => {}
        }
        action
    }

    fn note_focus(&self, control: Control) {
        if let Some(view) = self.inner.state.lock().guard.view_mut() {
            view.note_focus(control);
        }
    }

    /// Discard all state and effects. Idempotent.
    ///
    /// Timers are cancelled, the observer is disconnected and the surface
    /// is removed; in-flight operations see the flag and drop their results.
    pub fn teardown(&self) {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if st.torn_down {
            return;
        }
        st.torn_down = true;
        st.lock_active = false;
        for timer in [
            st.relock_timer.take(),
            st.cooldown_ticker.take(),
            st.repair_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.cancel();
        }
        st.guard.stop_observing(self.surface());
        st.guard.remove(self.surface());
        info!(host = %self.page().host(), "engine torn down");
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("page", &self.inner.page)
            .field("status", &self.status())
            .finish()
    }
}
