//! Navigation controller.
//!
//! Forward motion runs validate, flush, then advance or complete. Backward
//! motion and step jumps move the index directly with no validation and no
//! persistence. A single state cell doubles as the re-entrancy guard: while
//! it reads `Saving`, `Advancing` or `Completing`, another `next()` is a no-op.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{NavigationError, PersistenceError};

use super::finalizer::CompletionFinalizer;
use super::hooks::{NoticeLevel, Notifier};
use super::lifecycle::LifecycleGuard;
use super::scheduler::PersistenceScheduler;
use super::store::SessionStore;
use super::validator::StepValidator;

/// Controller state. `Completing` is terminal once the finalizer succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    Idle,
    Saving,
    Advancing,
    Completing,
    Error,
}

impl NavState {
    /// A forward navigation is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Saving | Self::Advancing | Self::Completing)
    }
}

/// Result of a `next()` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "step", rename_all = "snake_case")]
pub enum NextOutcome {
    /// Moved to the given step.
    Advanced(usize),
    /// The last step was saved and the session completed.
    Completed,
    /// The current step is not complete. Nothing was saved.
    Blocked,
    /// Another `next()` is still running.
    InFlight,
}

pub struct NavigationController {
    store: Arc<SessionStore>,
    scheduler: Arc<PersistenceScheduler>,
    validator: StepValidator,
    finalizer: CompletionFinalizer,
    guard: Arc<LifecycleGuard>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<NavState>,
}

impl NavigationController {
    pub fn new(
        store: Arc<SessionStore>,
        scheduler: Arc<PersistenceScheduler>,
        validator: StepValidator,
        finalizer: CompletionFinalizer,
        guard: Arc<LifecycleGuard>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            scheduler,
            validator,
            finalizer,
            guard,
            notifier,
            state: Mutex::new(NavState::Idle),
        }
    }

    pub fn state(&self) -> NavState {
        *self.lock_state()
    }

    pub fn validator(&self) -> &StepValidator {
        &self.validator
    }

    pub fn finalizer(&self) -> &CompletionFinalizer {
        &self.finalizer
    }

    /// Whether the current step passes its rule.
    pub fn can_advance(&self) -> bool {
        self.validator
            .validate(self.store.current_step(), &self.store.data())
    }

    /// What the current step still needs before `next()` will proceed.
    pub fn missing_fields(&self) -> Vec<String> {
        self.validator
            .missing_fields(self.store.current_step(), &self.store.data())
    }

    /// Validate the current step, flush, then advance or complete.
    ///
    /// A failed flush leaves the step index and data untouched and puts the
    /// controller in `Error`; calling `next()` again retries from the start.
    pub async fn next(&self) -> Result<NextOutcome, NavigationError> {
        if !self.guard.is_active() {
            return Err(NavigationError::SessionEnded);
        }

        let step = {
            let mut state = self.lock_state();
            if state.is_busy() {
                debug!(session_id = %self.store.session_id(), state = ?*state, "Navigation already in flight");
                return Ok(NextOutcome::InFlight);
            }
            let step = self.store.current_step();
            if !self.validator.validate(step, &self.store.data()) {
                debug!(session_id = %self.store.session_id(), step, "Step incomplete; not advancing");
                return Ok(NextOutcome::Blocked);
            }
            *state = NavState::Saving;
            step
        };

        if let Err(source) = self.scheduler.force_flush(self.store.data()).await {
            return Err(self.save_failed(step, source));
        }

        if step + 1 < self.store.step_count() {
            self.set_state(NavState::Advancing);
            if let Err(e) = self.store.set_step(step + 1) {
                self.set_state(NavState::Idle);
                return Err(e);
            }
            self.set_state(NavState::Idle);
            info!(session_id = %self.store.session_id(), from = step, to = step + 1, "Advanced onboarding step");
            return Ok(NextOutcome::Advanced(step + 1));
        }

        self.set_state(NavState::Completing);
        match self.finalizer.finalize().await {
            Ok(()) => {
                self.notifier
                    .notify(NoticeLevel::Success, "Onboarding complete");
                Ok(NextOutcome::Completed)
            }
            Err(PersistenceError::SessionEnded) if !self.guard.is_active() => {
                Err(NavigationError::SessionEnded)
            }
            Err(source) => {
                self.set_state(NavState::Error);
                self.notifier.notify(
                    NoticeLevel::Error,
                    "Could not finish onboarding. Please try again.",
                );
                Err(NavigationError::CompletionFailed { source })
            }
        }
    }

    /// Step back by one. No validation, no persistence.
    pub fn previous(&self) -> Result<usize, NavigationError> {
        let mut state = self.movable_state()?;
        let current = self.store.current_step();
        if current == 0 {
            return Err(NavigationError::AtFirstStep);
        }
        self.store.set_step(current - 1)?;
        *state = NavState::Idle;
        debug!(session_id = %self.store.session_id(), to = current - 1, "Moved back one step");
        Ok(current - 1)
    }

    /// Jump to an earlier (or the current) step. Forward jumps are refused.
    pub fn go_to(&self, target: usize) -> Result<usize, NavigationError> {
        let mut state = self.movable_state()?;
        let len = self.store.step_count();
        if target >= len {
            return Err(NavigationError::StepOutOfRange { index: target, len });
        }
        let current = self.store.current_step();
        if target > current {
            return Err(NavigationError::ForwardJump { current, target });
        }
        self.store.set_step(target)?;
        *state = NavState::Idle;
        debug!(session_id = %self.store.session_id(), from = current, to = target, "Jumped to step");
        Ok(target)
    }

    fn movable_state(&self) -> Result<MutexGuard<'_, NavState>, NavigationError> {
        if !self.guard.is_active() {
            return Err(NavigationError::SessionEnded);
        }
        let state = self.lock_state();
        if state.is_busy() {
            return Err(NavigationError::Busy);
        }
        Ok(state)
    }

    fn save_failed(&self, step: usize, source: PersistenceError) -> NavigationError {
        self.set_state(NavState::Error);
        warn!(session_id = %self.store.session_id(), step, error = %source, "Could not save before advancing");
        if self.guard.is_active() {
            self.notifier.notify(
                NoticeLevel::Error,
                "Could not save your progress. Please try again.",
            );
        }
        NavigationError::SaveFailed { step, source }
    }

    fn set_state(&self, next: NavState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, NavState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
