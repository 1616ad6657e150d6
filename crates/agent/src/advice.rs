//! Structured advice produced by the reasoning advisors.

use serde::{Deserialize, Serialize};

use crate::invoker::OutputShape;

/// One step of a [`QueryPlan`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// What to do
    #[serde(default)]
    pub step: String,
    /// Tool expected to do it, empty when none is needed
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Decomposition of a user query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub actionable_steps: Vec<PlanStep>,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub additional_considerations: Vec<String>,
    #[serde(default)]
    pub context: String,
}

impl QueryPlan {
    /// The plan used when the planner could not be reached: the error text
    /// travels in the step so later stages and logs can see it.
    pub fn degraded(query: &str, error: &str) -> Self {
        Self {
            summary: format!("Analysis of: {query}"),
            actionable_steps: vec![PlanStep {
                step: format!("Planning failed: {error}"),
                tool: format!("error: {error}"),
                reasoning: String::new(),
            }],
            clarification_questions: Vec::new(),
            additional_considerations: Vec::new(),
            context: String::new(),
        }
    }

    /// Stand-in plan when no planner ran.
    pub fn empty(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            ..Default::default()
        }
    }

    /// Cap steps and questions to the configured maxima.
    pub fn bounded(mut self, max_steps: usize, max_questions: usize) -> Self {
        self.actionable_steps.truncate(max_steps);
        self.clarification_questions.truncate(max_questions);
        self
    }
}

impl OutputShape for QueryPlan {
    fn shape() -> &'static str {
        r#"{
  "summary": "one sentence restating what the user needs",
  "actionable_steps": [{"step": "what to do", "tool": "tool name or empty", "reasoning": "why"}],
  "clarification_questions": ["question for the user"],
  "additional_considerations": ["caveat or constraint"],
  "context": "relevant facts from the conversation"
}"#
    }
}

/// The single best next action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextStepPlan {
    #[serde(default, alias = "action")]
    pub summary: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Clarification to ask instead of acting, if any
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub allowed_directories: Vec<String>,
}

impl NextStepPlan {
    /// Fallback carrying only the plan summary.
    pub fn from_summary(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            ..Default::default()
        }
    }

    /// One-line entry for the action log.
    pub fn log_entry(&self) -> String {
        match (self.tool.is_empty(), self.question.is_empty()) {
            (false, _) => format!("{} [tool: {}]", self.summary, self.tool),
            (true, false) => format!("{} [ask: {}]", self.summary, self.question),
            (true, true) => self.summary.clone(),
        }
    }
}

impl OutputShape for NextStepPlan {
    fn shape() -> &'static str {
        r#"{
  "summary": "the action to take next",
  "tool": "tool name or empty",
  "parameters": {"argument": "value"},
  "question": "clarifying question or empty",
  "reasoning": "why this is the most valuable next step",
  "allowed_directories": ["directory the tool may touch"]
}"#
    }
}

/// Raw verification verdict as the model returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextVerification {
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub missing_information: Option<String>,
    #[serde(default)]
    pub ambiguities: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
    #[serde(default)]
    pub confidence_level: Option<String>,
}

impl ContextVerification {
    pub fn failed(error: &str) -> Self {
        Self {
            is_complete: false,
            missing_information: Some(format!("Verification failed: {error}")),
            ambiguities: None,
            recommendations: None,
            confidence_level: Some("Low".into()),
        }
    }
}

impl OutputShape for ContextVerification {
    fn shape() -> &'static str {
        r#"{
  "is_complete": false,
  "missing_information": "what is still unknown",
  "ambiguities": "what is unclear",
  "recommendations": "how to close the gaps",
  "confidence_level": "Low | Medium | High"
}"#
    }
}

pub const NO_RECOMMENDATIONS: &str = "No recommendations";
pub const NO_MISSING_INFORMATION: &str = "No missing information";
pub const NO_AMBIGUITIES: &str = "No ambiguities";
pub const LOW_CONFIDENCE: &str = "Low";

/// Verification merged into the request context. Every field is filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub is_complete: bool,
    pub missing_information: String,
    pub ambiguities: String,
    pub recommendations: String,
    pub confidence_level: String,
}

impl From<ContextVerification> for VerificationSummary {
    fn from(v: ContextVerification) -> Self {
        fn or(value: Option<String>, placeholder: &str) -> String {
            value
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| placeholder.to_string())
        }
        Self {
            is_complete: v.is_complete,
            missing_information: or(v.missing_information, NO_MISSING_INFORMATION),
            ambiguities: or(v.ambiguities, NO_AMBIGUITIES),
            recommendations: or(v.recommendations, NO_RECOMMENDATIONS),
            confidence_level: or(v.confidence_level, LOW_CONFIDENCE),
        }
    }
}

/// Reviewer verdict on a finished answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalReview {
    #[serde(default = "default_true")]
    pub is_optimal: bool,
    #[serde(default)]
    pub critique: String,
    #[serde(default)]
    pub improved_answer: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CriticalReview {
    fn default() -> Self {
        Self {
            is_optimal: default_true(),
            critique: String::new(),
            improved_answer: None,
        }
    }
}

impl OutputShape for CriticalReview {
    fn shape() -> &'static str {
        r#"{
  "is_optimal": true,
  "critique": "what is wrong or missing, if anything",
  "improved_answer": "full replacement answer, or null when optimal"
}"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_plan_carries_error_text() {
        let plan = QueryPlan::degraded("find today's weather in Paris", "API down");
        assert_eq!(plan.summary, "Analysis of: find today's weather in Paris");
        assert!(plan.actionable_steps[0].step.contains("API down"));
        assert!(plan.actionable_steps[0].tool.contains("API down"));
    }

    #[test]
    fn plan_parses_with_missing_fields_and_is_bounded() {
        let plan: QueryPlan = serde_json::from_str(
            r#"{"summary": "s", "actionable_steps": [{"step": "a"}, {"step": "b"}, {"step": "c"}],
                "clarification_questions": ["q1", "q2"]}"#,
        )
        .unwrap();
        let plan = plan.bounded(2, 1);
        assert_eq!(plan.actionable_steps.len(), 2);
        assert_eq!(plan.clarification_questions, vec!["q1"]);
        assert!(plan.additional_considerations.is_empty());
    }

    #[test]
    fn next_step_accepts_action_alias() {
        let step: NextStepPlan = serde_json::from_str(r#"{"action": "search", "tool": "search"}"#).unwrap();
        assert_eq!(step.summary, "search");
        assert_eq!(step.log_entry(), "search [tool: search]");
    }

    #[test]
    fn verification_summary_fills_placeholders() {
        let summary = VerificationSummary::from(ContextVerification {
            is_complete: false,
            missing_information: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(summary.missing_information, NO_MISSING_INFORMATION);
        assert_eq!(summary.ambiguities, NO_AMBIGUITIES);
        assert_eq!(summary.recommendations, NO_RECOMMENDATIONS);
        assert_eq!(summary.confidence_level, LOW_CONFIDENCE);
    }

    #[test]
    fn failed_verification_is_incomplete_and_low_confidence() {
        let v = ContextVerification::failed("timeout");
        assert!(!v.is_complete);
        let summary = VerificationSummary::from(v);
        assert_eq!(summary.missing_information, "Verification failed: timeout");
        assert_eq!(summary.confidence_level, "Low");
    }

    #[test]
    fn review_defaults_to_optimal() {
        let review: CriticalReview = serde_json::from_str("{}").unwrap();
        assert!(review.is_optimal);
        assert!(review.improved_answer.is_none());
        assert_eq!(review, CriticalReview::default());
    }
}
