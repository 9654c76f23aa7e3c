//! Liveness token shared by the components of one session.
//!
//! Created when a session starts and invalidated exactly once at teardown.
//! Every deferred continuation (timer fire, save completion, analysis result)
//! checks `is_active()` before touching shared session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Liveness token shared by every component of one session.
pub struct LifecycleGuard {
    active: AtomicBool,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl LifecycleGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            cleanups: Mutex::new(Vec::new()),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Register a cleanup to run at teardown. Runs immediately if the
    /// session has already ended.
    pub fn on_end<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut cleanups = self.cleanups();
        if self.is_active() {
            cleanups.push(Box::new(cleanup));
        } else {
            drop(cleanups);
            cleanup();
        }
    }

    /// End the session. Returns `false` if it had already ended.
    ///
    /// The flag flips before any cleanup runs, so a continuation can never
    /// observe a cancelled timer while the session still reads as active.
    pub fn end(&self) -> bool {
        let pending = {
            let mut cleanups = self.cleanups();
            if !self.active.swap(false, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *cleanups)
        };

        debug!(cleanups = pending.len(), "Session lifecycle ended");
        for cleanup in pending {
            cleanup();
        }
        true
    }

    fn cleanups(&self) -> MutexGuard<'_, Vec<Cleanup>> {
        self.cleanups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LifecycleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("active", &self.is_active())
            .finish()
    }
}
