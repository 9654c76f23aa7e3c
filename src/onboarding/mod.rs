//! Onboarding wizard session controller.
//!
//! A session collects answers across a fixed list of steps. Edits are merged
//! into an in-memory store and saved in the background after a quiet period.
//! Moving forward validates the current step and forces a save first; the
//! last step finishes with a confirmed save and a one-time redirect. Every
//! deferred continuation checks the session's lifecycle guard before touching
//! shared state, so nothing runs against a session that has ended.

pub mod analysis;
pub mod finalizer;
pub mod hooks;
pub mod lifecycle;
pub mod model;
pub mod navigation;
pub mod persistence;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod steps;
pub mod store;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use analysis::{AnalysisProvider, run_analyses, run_analysis};
pub use finalizer::CompletionFinalizer;
pub use hooks::{LogNotifier, LogRedirect, NoticeLevel, Notifier, Redirect};
pub use lifecycle::LifecycleGuard;
pub use model::{COMPLETED_KEY, SessionData, SessionSnapshot, SessionStatus};
pub use navigation::{NavState, NavigationController, NextOutcome};
pub use persistence::{SessionPersistence, SettingsPersistence};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use scheduler::PersistenceScheduler;
pub use session::{OnboardingSession, SessionDeps};
pub use steps::{StepDefinition, StepKind, marketing_onboarding_steps};
pub use store::SessionStore;
pub use validator::{StepRule, StepValidator};
