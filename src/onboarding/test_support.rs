//! Stub collaborators shared by the onboarding unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PersistenceError;

use super::hooks::Redirect;
use super::model::SessionData;
use super::persistence::SessionPersistence;

/// Records every save; failures and latency can be injected.
#[derive(Default)]
pub(crate) struct RecordingPersistence {
    saved: Mutex<Vec<SessionData>>,
    calls: AtomicUsize,
    fail_next: AtomicUsize,
    fail_calls: Mutex<Vec<usize>>,
    reject_next: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
    seed: Option<SessionData>,
}

impl RecordingPersistence {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub(crate) fn with_seed(seed: SessionData) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Make the next `n` saves fail with a backend error.
    pub(crate) fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail the save with the given 1-based call number.
    pub(crate) fn fail_call(&self, call: usize) {
        self.fail_calls.lock().unwrap().push(call);
    }

    /// Make the next `n` saves resolve `false`.
    pub(crate) fn reject_next(&self, n: usize) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Successfully persisted snapshots, oldest first.
    pub(crate) fn saved(&self) -> Vec<SessionData> {
        self.saved.lock().unwrap().clone()
    }

    pub(crate) fn last_saved(&self) -> Option<SessionData> {
        self.saved.lock().unwrap().last().cloned()
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SessionPersistence for RecordingPersistence {
    async fn save(&self, snapshot: &SessionData) -> Result<bool, PersistenceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::take_one(&self.fail_next) || self.fail_calls.lock().unwrap().contains(&call) {
            return Err(PersistenceError::Backend("injected failure".to_string()));
        }
        if Self::take_one(&self.reject_next) {
            return Ok(false);
        }
        self.saved.lock().unwrap().push(snapshot.clone());
        Ok(true)
    }

    async fn load(&self) -> Result<Option<SessionData>, PersistenceError> {
        Ok(self.seed.clone())
    }
}

/// Records every redirect.
#[derive(Default)]
pub(crate) struct RecordingRedirect {
    targets: Mutex<Vec<(String, bool)>>,
}

impl RecordingRedirect {
    pub(crate) fn targets(&self) -> Vec<(String, bool)> {
        self.targets.lock().unwrap().clone()
    }
}

impl Redirect for RecordingRedirect {
    fn navigate(&self, path: &str, replace: bool) {
        self.targets.lock().unwrap().push((path.to_string(), replace));
    }
}
