//! Step validation: pure predicates gating forward navigation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::SessionData;
use super::steps::StepDefinition;

/// A swappable completeness rule for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StepRule {
    /// Every listed field (dotted paths allowed) is present and non-empty.
    RequiredFields { fields: Vec<String> },
    /// At least one listed field is present and non-empty.
    AnyOf { fields: Vec<String> },
    /// The value at `path` equals `value` exactly.
    FieldEquals { path: String, value: Value },
    /// Every nested rule passes.
    All { rules: Vec<StepRule> },
    /// Always passes (informational steps).
    Always,
}

impl StepRule {
    pub fn required(fields: &[&str]) -> Self {
        Self::RequiredFields {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn any_of(fields: &[&str]) -> Self {
        Self::AnyOf {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn field_equals(path: &str, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            path: path.to_string(),
            value: value.into(),
        }
    }

    pub fn evaluate(&self, data: &SessionData) -> bool {
        match self {
            Self::RequiredFields { fields } => fields.iter().all(|f| data.is_filled(f)),
            Self::AnyOf { fields } => fields.iter().any(|f| data.is_filled(f)),
            Self::FieldEquals { path, value } => data.get_path(path) == Some(value),
            Self::All { rules } => rules.iter().all(|r| r.evaluate(data)),
            Self::Always => true,
        }
    }

    /// Human-readable list of what is still missing.
    pub fn missing(&self, data: &SessionData) -> Vec<String> {
        match self {
            Self::RequiredFields { fields } => fields
                .iter()
                .filter(|f| !data.is_filled(f))
                .cloned()
                .collect(),
            Self::AnyOf { fields } => {
                if self.evaluate(data) {
                    Vec::new()
                } else {
                    vec![format!("one of: {}", fields.join(", "))]
                }
            }
            Self::FieldEquals { path, value } => {
                if self.evaluate(data) {
                    Vec::new()
                } else {
                    vec![format!("{path} = {value}")]
                }
            }
            Self::All { rules } => rules.iter().flat_map(|r| r.missing(data)).collect(),
            Self::Always => Vec::new(),
        }
    }
}

/// Per-step rule table. Unknown step indices fail closed.
#[derive(Debug, Clone)]
pub struct StepValidator {
    rules: Vec<StepRule>,
}

impl StepValidator {
    pub fn new(steps: &[StepDefinition]) -> Self {
        Self {
            rules: steps.iter().map(|s| s.rule.clone()).collect(),
        }
    }

    /// Whether the step at `index` is complete enough to advance past.
    pub fn validate(&self, index: usize, data: &SessionData) -> bool {
        self.rules
            .get(index)
            .is_some_and(|rule| rule.evaluate(data))
    }

    /// What the step at `index` still needs. An unknown step reports itself.
    pub fn missing_fields(&self, index: usize, data: &SessionData) -> Vec<String> {
        match self.rules.get(index) {
            Some(rule) => rule.missing(data),
            None => vec![format!("unknown step {index}")],
        }
    }

    /// First step whose rule does not pass, or the last step if all do.
    pub fn first_incomplete(&self, data: &SessionData) -> usize {
        self.rules
            .iter()
            .position(|rule| !rule.evaluate(data))
            .unwrap_or(self.rules.len().saturating_sub(1))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
