//! Remote save collaborator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::store::Database;

use super::model::{SessionData, settings_keys};

/// Where session snapshots are saved.
///
/// `save` always receives the latest full snapshot, never a diff, so a retry
/// after a failure carries everything the user has entered.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Persist the snapshot. `Ok(false)` means the store declined the write.
    async fn save(&self, snapshot: &SessionData) -> Result<bool, PersistenceError>;

    /// Load the last persisted snapshot, if any.
    async fn load(&self) -> Result<Option<SessionData>, PersistenceError>;
}

/// Saves the snapshot as a JSON blob in the settings table.
pub struct SettingsPersistence {
    db: Arc<dyn Database>,
    user_id: String,
}

impl SettingsPersistence {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl SessionPersistence for SettingsPersistence {
    async fn save(&self, snapshot: &SessionData) -> Result<bool, PersistenceError> {
        let value = serde_json::to_value(snapshot)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        self.db
            .set_setting(&self.user_id, settings_keys::ONBOARDING_DATA, &value)
            .await?;
        Ok(true)
    }

    async fn load(&self) -> Result<Option<SessionData>, PersistenceError> {
        let value = self
            .db
            .get_setting(&self.user_id, settings_keys::ONBOARDING_DATA)
            .await?;
        match value {
            Some(value) => SessionData::from_value(value).map(Some).ok_or_else(|| {
                PersistenceError::Serialization(
                    "persisted onboarding data is not an object".to_string(),
                )
            }),
            None => Ok(None),
        }
    }
}
