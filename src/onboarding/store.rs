//! In-memory ledger for one onboarding session.
//!
//! Everything here is synchronous. Every mutator checks the lifecycle guard
//! first and is a no-op once the session has ended.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::NavigationError;

use super::lifecycle::LifecycleGuard;
use super::model::{COMPLETED_KEY, SessionData, SessionSnapshot, SessionStatus};

/// Receives the full data snapshot after every `update`.
pub type SnapshotObserver = Box<dyn Fn(&SessionData) + Send + Sync>;

#[derive(Debug)]
struct StoreState {
    current_step: usize,
    data: SessionData,
    status: SessionStatus,
    last_saved_at: Option<DateTime<Utc>>,
}

pub struct SessionStore {
    session_id: Uuid,
    step_count: usize,
    guard: Arc<LifecycleGuard>,
    state: Mutex<StoreState>,
    observer: OnceLock<SnapshotObserver>,
}

impl SessionStore {
    pub fn new(
        session_id: Uuid,
        step_count: usize,
        initial_step: usize,
        seed: SessionData,
        guard: Arc<LifecycleGuard>,
    ) -> Self {
        Self {
            session_id,
            step_count,
            guard,
            state: Mutex::new(StoreState {
                current_step: initial_step.min(step_count.saturating_sub(1)),
                data: seed,
                status: SessionStatus::InProgress,
                last_saved_at: None,
            }),
            observer: OnceLock::new(),
        }
    }

    /// Install the update observer. Only the first call takes effect.
    pub fn subscribe(&self, observer: SnapshotObserver) -> bool {
        self.observer.set(observer).is_ok()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn get(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            session_id: self.session_id,
            current_step: state.current_step,
            step_count: self.step_count,
            data: state.data.clone(),
            status: state.status,
            last_saved_at: state.last_saved_at,
        }
    }

    pub fn data(&self) -> SessionData {
        self.state().data.clone()
    }

    pub fn current_step(&self) -> usize {
        self.state().current_step
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    /// Merge-patch the data and notify the observer with the new snapshot.
    ///
    /// The completion marker is reserved for the finalizer and is dropped
    /// from `partial`. Returns `false` (and changes nothing) once the session
    /// has ended.
    pub fn update(&self, mut partial: SessionData) -> bool {
        if !self.guard.is_active() {
            return false;
        }
        if partial.remove(COMPLETED_KEY).is_some() {
            warn!(session_id = %self.session_id, "Ignoring completion marker in data update");
        }
        let mut state = self.state();
        state.data.merge(partial);
        // Notify under the lock so observers see updates in call order.
        if let Some(observer) = self.observer.get() {
            observer(&state.data);
        }
        true
    }

    /// Merge-patch without notifying the observer.
    pub(crate) fn stage(&self, partial: SessionData) -> bool {
        if !self.guard.is_active() {
            return false;
        }
        self.state().data.merge(partial);
        true
    }

    pub fn set_step(&self, index: usize) -> Result<(), NavigationError> {
        if index >= self.step_count {
            return Err(NavigationError::StepOutOfRange {
                index,
                len: self.step_count,
            });
        }
        if !self.guard.is_active() {
            return Err(NavigationError::SessionEnded);
        }
        self.state().current_step = index;
        Ok(())
    }

    /// Set the status. `Completed` is terminal and never left.
    pub fn set_status(&self, status: SessionStatus) -> bool {
        if !self.guard.is_active() {
            return false;
        }
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }

    /// Record a successful save.
    pub fn mark_saved(&self, at: DateTime<Utc>) -> bool {
        if !self.guard.is_active() {
            return false;
        }
        let mut state = self.state();
        state.last_saved_at = Some(at);
        if !state.status.is_terminal() {
            state.status = SessionStatus::InProgress;
        }
        true
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
