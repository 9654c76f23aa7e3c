//! Catalog of the step kinds the wizard knows about.
//!
//! The core owns the step kinds and their completeness rules. Rendering is
//! left to the UI layer, which keeps its own dispatch table from `StepKind`
//! to a form.

use serde::{Deserialize, Serialize};

use super::validator::StepRule;

/// Key under which the website analysis provider records its result.
pub const WEBSITE_ANALYSIS_KEY: &str = "website_analysis";
/// Key under which the competitor intelligence provider records its result.
pub const COMPETITOR_ANALYSIS_KEY: &str = "competitor_analysis";
/// Status sentinel written by a finished analysis.
pub const ANALYSIS_COMPLETE: &str = "complete";

/// The kinds of onboarding steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    BusinessInfo,
    SocialPresence,
    GoalsAndBudget,
    WebsiteAnalysis,
    CompetitorIntelligence,
    /// Caller-defined step with an explicit rule.
    Custom,
}

impl StepKind {
    pub fn default_id(&self) -> &'static str {
        match self {
            Self::BusinessInfo => "business_info",
            Self::SocialPresence => "social_presence",
            Self::GoalsAndBudget => "goals_and_budget",
            Self::WebsiteAnalysis => "website_analysis",
            Self::CompetitorIntelligence => "competitor_intelligence",
            Self::Custom => "custom",
        }
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            Self::BusinessInfo => "Tell us about your business",
            Self::SocialPresence => "Connect your social channels",
            Self::GoalsAndBudget => "Goals and budget",
            Self::WebsiteAnalysis => "Website analysis",
            Self::CompetitorIntelligence => "Competitor intelligence",
            Self::Custom => "Custom step",
        }
    }

    pub fn default_rule(&self) -> StepRule {
        match self {
            Self::BusinessInfo => {
                StepRule::required(&["business_name", "industry", "target_audience"])
            }
            Self::SocialPresence => StepRule::any_of(&[
                "social_handles.instagram",
                "social_handles.facebook",
                "social_handles.linkedin",
                "social_handles.tiktok",
                "social_handles.x",
            ]),
            Self::GoalsAndBudget => StepRule::required(&["primary_goal", "monthly_budget"]),
            Self::WebsiteAnalysis => StepRule::field_equals(
                &format!("{WEBSITE_ANALYSIS_KEY}.status"),
                ANALYSIS_COMPLETE,
            ),
            Self::CompetitorIntelligence => StepRule::field_equals(
                &format!("{COMPETITOR_ANALYSIS_KEY}.status"),
                ANALYSIS_COMPLETE,
            ),
            Self::Custom => StepRule::Always,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_id())
    }
}

/// One page of the wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    pub title: String,
    pub kind: StepKind,
    pub rule: StepRule,
}

impl StepDefinition {
    /// A custom step with an explicit rule.
    pub fn new(id: impl Into<String>, title: impl Into<String>, rule: StepRule) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: StepKind::Custom,
            rule,
        }
    }

    /// A built-in step with its default id, title and rule.
    pub fn of_kind(kind: StepKind) -> Self {
        Self {
            id: kind.default_id().to_string(),
            title: kind.default_title().to_string(),
            kind,
            rule: kind.default_rule(),
        }
    }
}

/// The marketing onboarding wizard, in order.
pub fn marketing_onboarding_steps() -> Vec<StepDefinition> {
    [
        StepKind::BusinessInfo,
        StepKind::SocialPresence,
        StepKind::GoalsAndBudget,
        StepKind::WebsiteAnalysis,
        StepKind::CompetitorIntelligence,
    ]
    .into_iter()
    .map(StepDefinition::of_kind)
    .collect()
}

#[cfg(test)]
impl StepKind {
    /// Answers that satisfy this kind's default rule.
    pub(crate) fn sample_answers(&self) -> super::model::SessionData {
        use serde_json::json;

        let value = match self {
            Self::BusinessInfo => json!({
                "business_name": "Acme Coffee",
                "industry": "food_and_beverage",
                "target_audience": "commuters"
            }),
            Self::SocialPresence => json!({"social_handles": {"instagram": "@acmecoffee"}}),
            Self::GoalsAndBudget => json!({"primary_goal": "awareness", "monthly_budget": 1500}),
            Self::WebsiteAnalysis => json!({WEBSITE_ANALYSIS_KEY: {"status": ANALYSIS_COMPLETE}}),
            Self::CompetitorIntelligence => {
                json!({COMPETITOR_ANALYSIS_KEY: {"status": ANALYSIS_COMPLETE}})
            }
            Self::Custom => json!({}),
        };
        super::model::SessionData::from_value(value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_ids_in_order() {
        let steps = marketing_onboarding_steps();
        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "business_info",
                "social_presence",
                "goals_and_budget",
                "website_analysis",
                "competitor_intelligence"
            ]
        );
    }

    #[test]
    fn sample_answers_satisfy_default_rules() {
        for step in marketing_onboarding_steps() {
            let answers = step.kind.sample_answers();
            assert!(step.rule.evaluate(&answers), "{} should pass", step.kind);
        }
    }

    #[test]
    fn empty_data_fails_every_builtin_rule() {
        let empty = super::super::model::SessionData::new();
        for step in marketing_onboarding_steps() {
            assert!(!step.rule.evaluate(&empty), "{} should fail", step.kind);
        }
    }

    #[test]
    fn custom_step_keeps_given_rule() {
        let step = StepDefinition::new("terms", "Accept terms", StepRule::required(&["accepted"]));
        assert_eq!(step.kind, StepKind::Custom);
        assert_eq!(step.rule, StepRule::required(&["accepted"]));
    }
}
