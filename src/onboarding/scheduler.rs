//! Debounced persistence scheduler.
//!
//! Coalesces bursts of edits into one delayed save and offers an immediate
//! flush. The scheduler owns two pieces of shared state and nothing else
//! touches them:
//!
//! - a single timer slot: scheduling aborts the previous timer and installs a
//!   new one, tagged with a monotonically increasing generation. A timer that
//!   wakes up with a stale generation does nothing, even if the abort raced it.
//! - a save gate: saves run one at a time. A save that arrives while another
//!   is in flight waits behind it, and a queued debounce save re-checks its
//!   generation once it gets the gate, so a flush that superseded it wins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;

use super::lifecycle::LifecycleGuard;
use super::model::{SessionData, SessionStatus};
use super::persistence::SessionPersistence;
use super::store::SessionStore;

/// What triggered a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Debounce,
    Flush,
}

impl std::fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debounce => write!(f, "debounce"),
            Self::Flush => write!(f, "flush"),
        }
    }
}

#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

pub struct PersistenceScheduler {
    delay: Duration,
    tracked_fields: Vec<String>,
    persistence: Arc<dyn SessionPersistence>,
    store: Arc<SessionStore>,
    guard: Arc<LifecycleGuard>,
    runtime: Handle,
    slot: Mutex<TimerSlot>,
    save_gate: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    saves_issued: AtomicU64,
}

impl PersistenceScheduler {
    pub fn new(
        delay: Duration,
        tracked_fields: Vec<String>,
        persistence: Arc<dyn SessionPersistence>,
        store: Arc<SessionStore>,
        guard: Arc<LifecycleGuard>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            delay,
            tracked_fields,
            persistence,
            store,
            guard,
            runtime,
            slot: Mutex::new(TimerSlot::default()),
            save_gate: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            saves_issued: AtomicU64::new(0),
        })
    }

    /// Subscribe to store updates and cancel the timer at teardown.
    pub fn attach(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.store.subscribe(Box::new(move |data| {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.notify(data.clone());
            }
        }));

        let weak = Arc::downgrade(self);
        self.guard.on_end(move || {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.cancel();
            }
        });
    }

    /// Re-arm the debounce timer with the latest snapshot.
    pub fn notify(self: &Arc<Self>, snapshot: SessionData) {
        if !self.guard.is_active() {
            return;
        }

        let mut slot = self.slot();
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }

        let this = Arc::clone(self);
        let delay = self.delay;
        slot.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(generation, snapshot).await;
        }));

        debug!(
            session_id = %self.store.session_id(),
            generation,
            delay_ms = delay.as_millis() as u64,
            "Debounce timer armed"
        );
    }

    /// Cancel any pending timer and save `snapshot` right away.
    ///
    /// Skips the meaningfulness check. Waits behind a save already in flight.
    pub async fn force_flush(&self, snapshot: SessionData) -> Result<(), PersistenceError> {
        if !self.guard.is_active() {
            return Err(PersistenceError::SessionEnded);
        }
        self.cancel();
        self.run_save(snapshot, SaveTrigger::Flush).await
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        if let Some(pending) = slot.pending.take() {
            pending.abort();
            debug!(
                session_id = %self.store.session_id(),
                generation = slot.generation,
                "Debounce timer cancelled"
            );
        }
    }

    pub fn has_pending(&self) -> bool {
        self.slot().pending.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of `save` calls issued so far.
    pub fn saves_issued(&self) -> u64 {
        self.saves_issued.load(Ordering::Acquire)
    }

    async fn fire(self: Arc<Self>, generation: u64, snapshot: SessionData) {
        let session_id = self.store.session_id();
        // Leave the slot so a later notify cannot abort this save midway.
        {
            let mut slot = self.slot();
            if slot.generation != generation {
                debug!(%session_id, generation, "Stale debounce timer dropped");
                return;
            }
            slot.pending = None;
        }

        if !self.guard.is_active() {
            return;
        }
        if !snapshot.is_meaningful(&self.tracked_fields) {
            debug!(%session_id, generation, "Nothing worth saving yet");
            return;
        }
        // Only the finalizer's flush may persist the completion marker.
        if snapshot.is_completed() {
            debug!(%session_id, generation, "Completion marker in debounce snapshot, dropped");
            return;
        }

        let _permit = self.save_gate.lock().await;
        if !self.is_current(generation) || !self.guard.is_active() {
            debug!(%session_id, generation, "Debounce save superseded while queued");
            return;
        }
        // Failures are recorded on the session status; the next flush retries.
        let _ = self.save_locked(snapshot, SaveTrigger::Debounce).await;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.slot().generation == generation
    }

    async fn run_save(
        &self,
        snapshot: SessionData,
        trigger: SaveTrigger,
    ) -> Result<(), PersistenceError> {
        let _permit = self.save_gate.lock().await;
        self.save_locked(snapshot, trigger).await
    }

    /// Issue one save. The caller holds the save gate.
    async fn save_locked(
        &self,
        snapshot: SessionData,
        trigger: SaveTrigger,
    ) -> Result<(), PersistenceError> {
        let session_id = self.store.session_id();
        self.in_flight.store(true, Ordering::Release);
        self.saves_issued.fetch_add(1, Ordering::AcqRel);
        self.store.set_status(SessionStatus::Saving);

        let result = match self.persistence.save(&snapshot).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PersistenceError::Rejected),
            Err(e) => Err(e),
        };
        self.in_flight.store(false, Ordering::Release);

        if !self.guard.is_active() {
            info!(
                %session_id,
                %trigger,
                succeeded = result.is_ok(),
                "Save finished after session ended; outcome not applied"
            );
            return result;
        }

        match &result {
            Ok(()) => {
                self.store.mark_saved(Utc::now());
                debug!(%session_id, %trigger, fields = snapshot.len(), "Session saved");
            }
            Err(e) => {
                self.store.set_status(SessionStatus::Error);
                warn!(%session_id, %trigger, error = %e, "Session save failed");
            }
        }
        result
    }

    fn slot(&self) -> MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::onboarding::test_support::RecordingPersistence;

    const DELAY: Duration = Duration::from_millis(2000);

    struct Harness {
        scheduler: Arc<PersistenceScheduler>,
        store: Arc<SessionStore>,
        guard: Arc<LifecycleGuard>,
        persistence: Arc<RecordingPersistence>,
    }

    fn harness(persistence: RecordingPersistence, tracked: &[&str]) -> Harness {
        let guard = LifecycleGuard::new();
        let store = Arc::new(SessionStore::new(
            Uuid::new_v4(),
            3,
            0,
            SessionData::new(),
            Arc::clone(&guard),
        ));
        let persistence = Arc::new(persistence);
        let scheduler = PersistenceScheduler::new(
            DELAY,
            tracked.iter().map(|f| f.to_string()).collect(),
            Arc::clone(&persistence) as Arc<dyn SessionPersistence>,
            Arc::clone(&store),
            Arc::clone(&guard),
            Handle::current(),
        );
        scheduler.attach();
        Harness {
            scheduler,
            store,
            guard,
            persistence,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_coalesces_into_one_save() {
        let h = harness(RecordingPersistence::new(), &[]);
        for i in 0..5 {
            h.store.update(SessionData::new().with("business_name", format!("Acme {i}")));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(h.persistence.calls(), 0);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(h.persistence.calls(), 1);
        let saved = h.persistence.last_saved().unwrap();
        assert_eq!(saved.get("business_name").unwrap(), "Acme 4");
        assert!(h.store.get().last_saved_at.is_some());
        assert!(!h.scheduler.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_waits_for_full_delay() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.store.update(SessionData::new().with("industry", "retail"));
        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(h.persistence.calls(), 0);
        assert!(h.scheduler.has_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(h.persistence.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_cancels_pending_timer() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.store.update(SessionData::new().with("industry", "retail"));
        assert!(h.scheduler.has_pending());

        h.scheduler.force_flush(h.store.data()).await.unwrap();
        assert!(!h.scheduler.has_pending());
        assert_eq!(h.persistence.calls(), 1);

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(h.persistence.calls(), 1);
        assert_eq!(h.scheduler.saves_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_snapshot_is_not_debounced_but_can_be_flushed() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.store.update(SessionData::new().with("business_name", "   "));
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(h.persistence.calls(), 0);

        h.scheduler.force_flush(h.store.data()).await.unwrap();
        assert_eq!(h.persistence.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_edits_are_not_saved() {
        let h = harness(RecordingPersistence::new(), &["business_name"]);
        h.store.update(SessionData::new().with("scratch", "notes"));
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(h.persistence.calls(), 0);

        h.store.update(SessionData::new().with("business_name", "Acme"));
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(h.persistence.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_save_after_teardown() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.store.update(SessionData::new().with("industry", "retail"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.guard.end();
        assert!(!h.scheduler.has_pending());

        tokio::time::sleep(DELAY * 5).await;
        assert_eq!(h.persistence.calls(), 0);
        assert!(matches!(
            h.scheduler.force_flush(SessionData::new().with("a", 1)).await,
            Err(PersistenceError::SessionEnded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_marks_error_and_keeps_data() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.persistence.fail_next(1);
        h.store.update(SessionData::new().with("industry", "retail"));
        tokio::time::sleep(DELAY + Duration::from_millis(10)).await;

        assert_eq!(h.persistence.calls(), 1);
        assert_eq!(h.store.status(), SessionStatus::Error);
        assert_eq!(h.store.data().get("industry").unwrap(), "retail");

        // Retry carries the full snapshot.
        h.store.update(SessionData::new().with("business_name", "Acme"));
        h.scheduler.force_flush(h.store.data()).await.unwrap();
        let saved = h.persistence.last_saved().unwrap();
        assert_eq!(saved.get("industry").unwrap(), "retail");
        assert_eq!(saved.get("business_name").unwrap(), "Acme");
        assert_eq!(h.store.status(), SessionStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_save_is_an_error() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.persistence.reject_next(1);
        let result = h.scheduler.force_flush(SessionData::new().with("a", 1)).await;
        assert!(matches!(result, Err(PersistenceError::Rejected)));
        assert_eq!(h.store.status(), SessionStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn saves_never_overlap() {
        let h = harness(
            RecordingPersistence::with_latency(Duration::from_millis(100)),
            &[],
        );
        let first = h.scheduler.force_flush(SessionData::new().with("a", 1));
        let second = h.scheduler.force_flush(SessionData::new().with("a", 2));
        let (a, b) = tokio::join!(first, second);
        a.unwrap();
        b.unwrap();

        assert_eq!(h.persistence.calls(), 2);
        assert_eq!(h.persistence.max_in_flight(), 1);
    }

    fn slow_flush_in_background(h: &Harness) -> JoinHandle<Result<(), PersistenceError>> {
        let scheduler = Arc::clone(&h.scheduler);
        tokio::spawn(async move {
            scheduler
                .force_flush(SessionData::new().with("business_name", "Acme"))
                .await
        })
    }

    #[tokio::test(start_paused = true)]
    async fn queued_debounce_save_yields_to_later_flush() {
        let h = harness(
            RecordingPersistence::with_latency(Duration::from_millis(3000)),
            &[],
        );
        let first = slow_flush_in_background(&h);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Fires at 2010ms and waits for the gate until 3000ms.
        h.store.update(SessionData::new().with("industry", "retail"));
        tokio::time::sleep(Duration::from_millis(2490)).await;
        assert_eq!(h.persistence.calls(), 1);
        assert!(!h.scheduler.has_pending());

        h.scheduler.force_flush(h.store.data()).await.unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(h.persistence.calls(), 2);

        tokio::time::sleep(DELAY * 5).await;
        assert_eq!(h.persistence.calls(), 2);
        assert_eq!(h.persistence.max_in_flight(), 1);
        assert_eq!(h.persistence.last_saved().unwrap().get("industry").unwrap(), "retail");
    }

    #[tokio::test(start_paused = true)]
    async fn queued_debounce_save_yields_to_newer_edit() {
        let h = harness(
            RecordingPersistence::with_latency(Duration::from_millis(3000)),
            &[],
        );
        let first = slow_flush_in_background(&h);
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.store.update(SessionData::new().with("industry", "retail"));
        tokio::time::sleep(Duration::from_millis(2490)).await;
        // The 2010ms save is still queued behind the first flush.
        h.store.update(SessionData::new().with("industry", "bakery"));

        first.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.persistence.calls(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.persistence.calls(), 2);
        assert_eq!(h.persistence.max_in_flight(), 1);
        assert_eq!(h.persistence.last_saved().unwrap().get("industry").unwrap(), "bakery");
        assert_eq!(h.scheduler.saves_issued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_never_saves_completion_marker() {
        let h = harness(RecordingPersistence::new(), &[]);
        h.scheduler.notify(
            SessionData::new()
                .with("business_name", "Acme")
                .with(crate::onboarding::model::COMPLETED_KEY, true),
        );
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(h.persistence.calls(), 0);
        assert!(!h.scheduler.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn save_finishing_after_teardown_is_not_applied() {
        let h = harness(
            RecordingPersistence::with_latency(Duration::from_millis(200)),
            &[],
        );
        let scheduler = Arc::clone(&h.scheduler);
        let flush = tokio::spawn(async move {
            scheduler
                .force_flush(SessionData::new().with("industry", "retail"))
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.scheduler.is_saving());
        h.guard.end();

        flush.await.unwrap().unwrap();
        assert_eq!(h.scheduler.saves_issued(), 1);
        assert!(h.store.get().last_saved_at.is_none());
        assert!(!h.scheduler.is_saving());
    }
}
