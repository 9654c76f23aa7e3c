//! Session data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Key of the completion marker inside `SessionData`.
pub const COMPLETED_KEY: &str = "completed";

/// Accumulated wizard answers: field name → value.
///
/// Only ever changed by merge-patch: a partial update overwrites the keys it
/// names and leaves every other key untouched. The field-level schema belongs
/// to the step definitions, not to this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Map<String, Value>);

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. Anything other than an object is `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Builder-style insert, mostly for constructing partial updates.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Overwrite the keys named by `partial`.
    pub fn merge(&mut self, partial: SessionData) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a dotted path such as `website_analysis.status`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Whether the value at `path` is present and non-trivial.
    pub fn is_filled(&self, path: &str) -> bool {
        self.get_path(path).is_some_and(is_non_trivial)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this snapshot is worth a background save.
    ///
    /// With no tracked fields, any non-trivial field qualifies.
    pub fn is_meaningful(&self, tracked_fields: &[String]) -> bool {
        if tracked_fields.is_empty() {
            self.0.values().any(is_non_trivial)
        } else {
            tracked_fields.iter().any(|field| self.is_filled(field))
        }
    }

    /// Whether the completion marker is set.
    pub fn is_completed(&self) -> bool {
        matches!(self.0.get(COMPLETED_KEY), Some(Value::Bool(true)))
    }
}

impl From<Map<String, Value>> for SessionData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Empty strings, empty collections, `null` and `false` count as unanswered.
fn is_non_trivial(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => map.values().any(is_non_trivial),
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Saving,
    Completed,
    Error,
}

impl SessionStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "in_progress",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time copy of the session ledger.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub current_step: usize,
    pub step_count: usize,
    pub data: SessionData,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<DateTime<Utc>>,
}

/// Settings keys used for onboarding persistence.
pub mod settings_keys {
    /// Key for the SessionData JSON blob in the settings table.
    pub const ONBOARDING_DATA: &str = "onboarding_data";
    /// Default user ID (single-user system).
    pub const DEFAULT_USER: &str = "default";
}
