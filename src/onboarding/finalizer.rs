//! Completion finalizer: the terminal save-and-redirect sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::PersistenceError;

use super::hooks::Redirect;
use super::lifecycle::LifecycleGuard;
use super::model::{COMPLETED_KEY, SessionData, SessionStatus};
use super::scheduler::PersistenceScheduler;
use super::store::SessionStore;

pub struct CompletionFinalizer {
    store: Arc<SessionStore>,
    scheduler: Arc<PersistenceScheduler>,
    guard: Arc<LifecycleGuard>,
    redirect: Arc<dyn Redirect>,
    redirect_path: String,
    redirected: AtomicBool,
}

impl CompletionFinalizer {
    pub fn new(
        store: Arc<SessionStore>,
        scheduler: Arc<PersistenceScheduler>,
        guard: Arc<LifecycleGuard>,
        redirect: Arc<dyn Redirect>,
        redirect_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scheduler,
            guard,
            redirect,
            redirect_path: redirect_path.into(),
            redirected: AtomicBool::new(false),
        }
    }

    /// Mark the session completed, flush it, then redirect exactly once.
    ///
    /// The in-memory `completed` marker is only kept if the flush succeeds.
    /// On failure it is reverted, the status is `Error`, and calling
    /// `finalize` again re-runs the whole sequence.
    pub async fn finalize(&self) -> Result<(), PersistenceError> {
        if self.redirected.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.guard.is_active() {
            return Err(PersistenceError::SessionEnded);
        }

        let session_id = self.store.session_id();
        self.store.stage(SessionData::new().with(COMPLETED_KEY, true));

        let staged = self.store.data();
        if let Err(e) = self.scheduler.force_flush(staged.clone()).await {
            self.revert_marker(&staged);
            warn!(%session_id, error = %e, "Completion flush failed");
            return Err(e);
        }

        if !self.guard.is_active() {
            info!(%session_id, "Completion saved after session ended; redirect skipped");
            return Err(PersistenceError::SessionEnded);
        }

        self.store.set_status(SessionStatus::Completed);
        if !self.redirected.swap(true, Ordering::AcqRel) {
            info!(%session_id, path = %self.redirect_path, "Onboarding completed");
            self.redirect.navigate(&self.redirect_path, true);
        }
        self.guard.end();
        Ok(())
    }

    /// Target of the redirect, once it has happened.
    pub fn redirected_to(&self) -> Option<&str> {
        self.redirected
            .load(Ordering::Acquire)
            .then_some(self.redirect_path.as_str())
    }

    fn revert_marker(&self, flushed: &SessionData) {
        let edited = self.store.data() != *flushed;
        // Timers armed during the flush carry the marker, including one
        // already queued behind the failed save.
        self.scheduler.cancel();
        self.store.stage(SessionData::new().with(COMPLETED_KEY, false));
        self.store.set_status(SessionStatus::Error);
        if edited {
            self.scheduler.notify(self.store.data());
        }
    }
}
