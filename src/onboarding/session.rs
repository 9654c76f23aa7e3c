//! OnboardingSession: wires the store, scheduler, navigation controller and
//! finalizer of one wizard run around a shared lifecycle guard.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;
use uuid::Uuid;

use crate::config::OnboardingConfig;
use crate::error::{AnalysisError, NavigationError, Result, SessionError};

use super::analysis::{self, AnalysisProvider};
use super::finalizer::CompletionFinalizer;
use super::hooks::{LogNotifier, LogRedirect, Notifier, Redirect};
use super::lifecycle::LifecycleGuard;
use super::model::{SessionData, SessionSnapshot};
use super::navigation::{NavState, NavigationController, NextOutcome};
use super::persistence::SessionPersistence;
use super::scheduler::PersistenceScheduler;
use super::steps::StepDefinition;
use super::store::SessionStore;
use super::validator::StepValidator;

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub persistence: Arc<dyn SessionPersistence>,
    pub redirect: Arc<dyn Redirect>,
    pub notifier: Arc<dyn Notifier>,
}

impl SessionDeps {
    /// Headless collaborators: redirects and notices only go to the log.
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            persistence,
            redirect: Arc::new(LogRedirect),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_redirect(mut self, redirect: Arc<dyn Redirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

pub struct OnboardingSession {
    steps: Vec<StepDefinition>,
    store: Arc<SessionStore>,
    scheduler: Arc<PersistenceScheduler>,
    navigation: NavigationController,
    guard: Arc<LifecycleGuard>,
}

impl OnboardingSession {
    /// Start a session at the first step, seeded with `seed`.
    ///
    /// Must be called from within a tokio runtime; debounce timers are
    /// spawned on it.
    pub fn start(
        steps: Vec<StepDefinition>,
        seed: SessionData,
        deps: SessionDeps,
        config: &OnboardingConfig,
    ) -> Result<Self> {
        Self::start_at(steps, seed, 0, deps, config)
    }

    /// Load the persisted snapshot and continue at the first incomplete step.
    pub async fn resume(
        steps: Vec<StepDefinition>,
        deps: SessionDeps,
        config: &OnboardingConfig,
    ) -> Result<Self> {
        let seed = deps.persistence.load().await?.unwrap_or_default();
        if seed.is_completed() {
            return Err(SessionError::AlreadyCompleted.into());
        }
        let step = StepValidator::new(&steps).first_incomplete(&seed);
        Self::start_at(steps, seed, step, deps, config)
    }

    fn start_at(
        steps: Vec<StepDefinition>,
        seed: SessionData,
        step: usize,
        deps: SessionDeps,
        config: &OnboardingConfig,
    ) -> Result<Self> {
        if steps.is_empty() {
            return Err(SessionError::NoSteps.into());
        }
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let guard = LifecycleGuard::new();
        let store = Arc::new(SessionStore::new(
            Uuid::new_v4(),
            steps.len(),
            step,
            seed,
            Arc::clone(&guard),
        ));
        let scheduler = PersistenceScheduler::new(
            config.debounce,
            config.tracked_fields.clone(),
            deps.persistence,
            Arc::clone(&store),
            Arc::clone(&guard),
            runtime,
        );
        scheduler.attach();

        let finalizer = CompletionFinalizer::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            Arc::clone(&guard),
            deps.redirect,
            config.redirect_path.clone(),
        );
        let navigation = NavigationController::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            StepValidator::new(&steps),
            finalizer,
            Arc::clone(&guard),
            deps.notifier,
        );

        info!(
            session_id = %store.session_id(),
            steps = steps.len(),
            step = store.current_step(),
            "Onboarding session started"
        );

        Ok(Self {
            steps,
            store,
            scheduler,
            navigation,
            guard,
        })
    }

    pub fn id(&self) -> Uuid {
        self.store.session_id()
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.get()
    }

    /// Merge-patch the answers. Returns `false` once the session has ended.
    pub fn update(&self, partial: SessionData) -> bool {
        self.store.update(partial)
    }

    pub async fn next(&self) -> std::result::Result<NextOutcome, NavigationError> {
        self.navigation.next().await
    }

    pub fn previous(&self) -> std::result::Result<usize, NavigationError> {
        self.navigation.previous()
    }

    pub fn go_to(&self, target: usize) -> std::result::Result<usize, NavigationError> {
        self.navigation.go_to(target)
    }

    pub fn can_advance(&self) -> bool {
        self.navigation.can_advance()
    }

    pub fn missing_fields(&self) -> Vec<String> {
        self.navigation.missing_fields()
    }

    pub fn nav_state(&self) -> NavState {
        self.navigation.state()
    }

    /// Where the user was sent on completion, if it happened.
    pub fn redirected_to(&self) -> Option<&str> {
        self.navigation.finalizer().redirected_to()
    }

    pub fn has_pending_save(&self) -> bool {
        self.scheduler.has_pending()
    }

    pub async fn run_analysis(
        &self,
        provider: &dyn AnalysisProvider,
    ) -> std::result::Result<bool, AnalysisError> {
        analysis::run_analysis(&self.store, provider).await
    }

    pub async fn run_analyses(
        &self,
        providers: &[Arc<dyn AnalysisProvider>],
    ) -> Vec<std::result::Result<bool, AnalysisError>> {
        analysis::run_analyses(&self.store, providers).await
    }

    pub fn is_active(&self) -> bool {
        self.guard.is_active()
    }

    /// Tear the session down: cancel the pending timer and freeze all state.
    /// Returns `false` if it had already ended.
    pub fn end(&self) -> bool {
        let ended = self.guard.end();
        if ended {
            info!(session_id = %self.id(), "Onboarding session ended");
        }
        ended
    }
}

impl Drop for OnboardingSession {
    fn drop(&mut self) {
        self.guard.end();
    }
}
