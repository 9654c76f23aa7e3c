//! Error types for the onboarding flow.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of the remote save collaborator.
///
/// All of these are recoverable: the in-memory session data is never rolled
/// back, and the next flush retries with the full current snapshot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("Save was rejected by the backing store")]
    Rejected,

    #[error("Backing store failed: {0}")]
    Backend(String),

    #[error("Failed to serialize session data: {0}")]
    Serialization(String),

    #[error("Session has ended")]
    SessionEnded,
}

impl From<DatabaseError> for PersistenceError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Serialization(reason) => Self::Serialization(reason),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Wizard navigation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NavigationError {
    #[error("Already at the first step")]
    AtFirstStep,

    #[error("Cannot jump forward from step {current} to step {target}")]
    ForwardJump { current: usize, target: usize },

    #[error("Step {index} is out of range (session has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("Session has ended")]
    SessionEnded,

    #[error("Another navigation is in flight")]
    Busy,

    #[error("Failed to save step {step}: {source}")]
    SaveFailed {
        step: usize,
        #[source]
        source: PersistenceError,
    },

    #[error("Failed to complete onboarding: {source}")]
    CompletionFailed {
        #[source]
        source: PersistenceError,
    },
}

/// Session construction errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("An onboarding session needs at least one step")]
    NoSteps,

    #[error("No tokio runtime available to drive background saves")]
    NoRuntime,

    #[error("Onboarding was already completed")]
    AlreadyCompleted,
}

/// Analysis provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Analysis provider {provider} failed: {reason}")]
    Failed { provider: String, reason: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
