//! Unlock Scheduler, cooldown countdown and debounced tamper repair.
//!
//! Each timer is a spawned tokio task whose handle lives in the page
//! state. Handles carry an id so a firing task only clears its own slot;
//! a superseded task is aborted before it can act.

use super::{Enforcer, PageState, PageStatus};
use crate::guard::surface::MutationRecord;
use crate::guard::view::cooldown_message;
use crate::guard::EnsureOutcome;
use crate::store::unlocks::clear_temp_unlock;
use crate::LockError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle of a spawned timer task.
pub(crate) struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

impl PendingTimer {
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

impl Enforcer {
    /// Schedule the relock for a temporary unlock expiring at `expires_at`.
    ///
    /// Replaces any pending relock. An expiry already in the past clears
    /// the entry and re-locks immediately.
    ///
    /// # Errors
    /// * `TornDown` - the engine was torn down
    /// * `Store` / `ContextInvalidated` - the entry could not be cleared
    pub async fn schedule_relock(&self, expires_at: i64) -> Result<PageStatus, LockError> {
        self.ensure_live()?;
        if expires_at <= self.now_millis() {
            self.cancel_relock();
            clear_temp_unlock(self.store(), self.page().key()).await?;
            return self.reconcile().await;
        }
        self.arm_relock(expires_at);
        Ok(self.status())
    }

    pub(crate) fn arm_relock(&self, expires_at: i64) {
        let delay_ms = u64::try_from(expires_at - self.now_millis()).unwrap_or(0);
        let mut st = self.inner.state.lock();
        if st.torn_down {
            return;
        }
        if let Some(previous) = st.relock_timer.take() {
            previous.cancel();
        }
        let id = st.next_timer_id();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            this.run_trigger("relock", this.relock_due(id)).await;
        });
        st.relock_timer = Some(PendingTimer { id, handle });
        debug!(host = %self.page().host(), expires_at, "relock armed");
    }

    pub(crate) fn cancel_relock(&self) {
        if let Some(timer) = self.inner.state.lock().relock_timer.take() {
            timer.cancel();
        }
    }

    async fn relock_due(&self, id: u64) -> Result<PageStatus, LockError> {
        {
            let mut st = self.inner.state.lock();
            if st.torn_down {
                return Err(LockError::TornDown);
            }
            match &st.relock_timer {
                Some(timer) if timer.id == id => st.relock_timer = None,
                _ => return Ok(st.status()),
            }
        }
        info!(host = %self.page().host(), "temporary unlock expired");
        clear_temp_unlock(self.store(), self.page().key()).await?;
        self.reconcile().await
    }

    pub(crate) fn start_cooldown_ticker(&self, st: &mut PageState) {
        if let Some(previous) = st.cooldown_ticker.take() {
            previous.cancel();
        }
        let id = st.next_timer_id();
        let tick = self.inner.config.cooldown_tick;
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            loop {
                interval.tick().await;
                if !this.cooldown_tick(id) {
                    break;
                }
            }
        });
        st.cooldown_ticker = Some(PendingTimer { id, handle });
    }

    /// Refresh the countdown. Returns whether the ticker should keep going.
    fn cooldown_tick(&self, id: u64) -> bool {
        let now = self.now_millis();
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if st.torn_down || st.cooldown_ticker.as_ref().map(|t| t.id) != Some(id) {
            return false;
        }
        match st.throttle.tick(now) {
            Some(remaining_secs) => {
                if let Some(view) = st.guard.view_mut() {
                    view.set_error(cooldown_message(remaining_secs));
                }
                st.guard.render(self.surface());
                true
            }
            None => {
                st.cooldown_ticker = None;
                if let Some(view) = st.guard.view_mut() {
                    view.set_disabled(false);
                    view.clear_error();
                }
                st.guard.render(self.surface());
                if st.lock_active {
                    st.guard.focus_first(self.surface());
                }
                debug!(host = %self.page().host(), "cooldown finished");
                false
            }
        }
    }

    /// React to a batch of document mutations while locked.
    ///
    /// At most one repair is queued at a time; it runs after
    /// `repair_debounce` and re-asserts the overlay.
    pub fn handle_mutations(&self, records: &[MutationRecord]) {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if st.torn_down || !st.lock_active {
            return;
        }
        if !st.guard.needs_repair(self.surface(), records) {
            return;
        }
        if !st.guard.try_schedule_repair() {
            return;
        }
        let id = st.next_timer_id();
        let delay = self.inner.config.repair_debounce;
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.run_repair(id);
        });
        st.repair_task = Some(PendingTimer { id, handle });
    }

    fn run_repair(&self, id: u64) {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        if st.repair_task.as_ref().map(|t| t.id) == Some(id) {
            st.repair_task = None;
        }
        st.guard.finish_repair();
        if st.torn_down || !st.lock_active {
            return;
        }
        match st.guard.ensure(
            self.surface(),
            self.page().host(),
            st.credential.as_ref(),
            &self.inner.config,
        ) {
            Ok(EnsureOutcome::Mounted) => info!(host = %self.page().host(), "overlay repaired"),
            Ok(EnsureOutcome::Intact) => debug!(host = %self.page().host(), "overlay restyled"),
            Err(e) => warn!(host = %self.page().host(), error = %e, "overlay repair failed"),
        }
    }
}
