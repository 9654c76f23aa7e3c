//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Reference debounce delay between the last edit and the background save.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Onboarding service configuration.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Quiet period after the last edit before a background save fires.
    pub debounce: Duration,
    /// Where the redirect collaborator sends the user after completion.
    pub redirect_path: String,
    /// Fields that make a snapshot worth saving in the background.
    /// Empty means any non-empty field counts.
    pub tracked_fields: Vec<String>,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// HTTP port for the headless wizard API.
    pub port: u16,
    /// Owner of the persisted onboarding record in the settings table.
    pub user_id: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            redirect_path: "/dashboard".to_string(),
            tracked_fields: Vec::new(),
            db_path: PathBuf::from("./data/onboarding.db"),
            port: 8080,
            user_id: "default".to_string(),
        }
    }
}

impl OnboardingConfig {
    /// Load configuration from `ONBOARDING_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("ONBOARDING_DEBOUNCE_MS") {
            let ms: u64 = parse_value("ONBOARDING_DEBOUNCE_MS", &raw)?;
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("ONBOARDING_REDIRECT_PATH") {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    key: "ONBOARDING_REDIRECT_PATH".to_string(),
                    message: format!("expected an absolute path, got {path:?}"),
                });
            }
            config.redirect_path = path;
        }
        if let Some(raw) = lookup("ONBOARDING_TRACKED_FIELDS") {
            config.tracked_fields = raw
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = lookup("ONBOARDING_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("ONBOARDING_PORT") {
            config.port = parse_value("ONBOARDING_PORT", &raw)?;
        }
        if let Some(user) = lookup("ONBOARDING_USER") {
            config.user_id = user;
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
