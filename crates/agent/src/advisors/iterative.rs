//! Bounded iterative reasoning.
//!
//! Each round verifies whether the gathered context answers the objective.
//! Complete context ends the loop. Otherwise the required-skills analysis
//! runs (once per request), the verification is merged into the context and
//! a next step is chosen and logged. After `max_iterations` incomplete rounds
//! the continuation marker is appended to the outgoing text and the request
//! moves on.
//!
//! Every model call here is fail-soft. A failed verification counts as
//! incomplete, so the bound is what guarantees termination.

use async_trait::async_trait;
use deliberate_core::message::Message;
use tracing::{debug, info, warn};

use crate::advice::{ContextVerification, NextStepPlan, QueryPlan, VerificationSummary};
use crate::advisor::Advisor;
use crate::advisors::next_step::select_next_step;
use crate::advisors::{PROMPT_HISTORY, advice_note};
use crate::envelope::AdvisedRequest;
use crate::invoker::{ModelInvoker, Prompt};
use crate::prompts::{
    ANALYSIS_SYSTEM, ANALYSIS_TEMPLATE, CONTINUATION_MARKER, VERIFICATION_SYSTEM, VERIFICATION_TEMPLATE,
    history_excerpt, numbered, tool_list,
};

pub const ORDER: i32 = 300;

pub struct IterativeReasoningAdvisor {
    invoker: ModelInvoker,
    max_iterations: usize,
}

impl IterativeReasoningAdvisor {
    pub fn new(invoker: ModelInvoker) -> Self {
        Self {
            invoker,
            max_iterations: 4,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    async fn verify(&self, request: &AdvisedRequest) -> ContextVerification {
        let plan = request
            .context
            .plan
            .as_ref()
            .map(|p| p.summary.clone())
            .unwrap_or_else(|| "(no plan)".into());
        let prompt = Prompt::new(VERIFICATION_TEMPLATE)
            .with_system(VERIFICATION_SYSTEM)
            .param("objective", request.query.as_str())
            .param("plan", plan)
            .param("history", history_excerpt(&request.history, PROMPT_HISTORY))
            .param("action_log", numbered(&request.context.action_log));

        self.invoker.structured(&prompt).await.unwrap_or_else(|e| {
            warn!(error = %e, "Context verification failed, treating as incomplete");
            ContextVerification::failed(&e.to_string())
        })
    }

    /// Identify required skills and tools; the answer is folded into history.
    async fn analyze(&self, request: &mut AdvisedRequest) {
        let prompt = Prompt::new(ANALYSIS_TEMPLATE)
            .with_system(ANALYSIS_SYSTEM)
            .param("query", request.query.as_str())
            .param("tools", tool_list(&request.tools));

        match self.invoker.text(&prompt).await {
            Ok(analysis) => request.history.push(
                Message::system(format!("Required skills and tools:\n{analysis}"))
                    .with_metadata("advisor", self.name().into()),
            ),
            Err(e) => warn!(error = %e, "Skills analysis failed, continuing without it"),
        }
    }

    async fn next_step(&self, request: &AdvisedRequest, gaps: &VerificationSummary) -> NextStepPlan {
        let plan = request
            .context
            .plan
            .clone()
            .unwrap_or_else(|| QueryPlan::empty(&request.text));
        select_next_step(
            &self.invoker,
            &plan,
            &request.tools,
            &request.context.action_log,
            Some(gaps),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Next-step selection failed, falling back to plan summary");
            NextStepPlan::from_summary(&plan.summary)
        })
    }
}

#[async_trait]
impl Advisor for IterativeReasoningAdvisor {
    fn name(&self) -> &str {
        "iterative_reasoning"
    }

    fn order(&self) -> i32 {
        ORDER
    }

    async fn before(&self, mut request: AdvisedRequest) -> AdvisedRequest {
        for iteration in 0..self.max_iterations {
            request.context.iterations = iteration + 1;

            let verification = self.verify(&request).await;
            if verification.is_complete {
                info!(iterations = iteration + 1, "Context verified complete");
                request.context.verification = Some(verification.into());
                return request;
            }

            if !request.context.analyzed {
                self.analyze(&mut request).await;
                request.context.analyzed = true;
            }

            let gaps = VerificationSummary::from(verification);
            let step = self.next_step(&request, &gaps).await;
            debug!(iteration, action = %step.summary, "Iteration chose next step");

            if let Some(note) = advice_note(self.name(), "Next step", &step) {
                request.history.push(note);
            }
            request.context.action_log.push(step.log_entry());
            request.context.verification = Some(gaps);
            request.context.next_step = Some(step);
        }

        warn!(max_iterations = self.max_iterations, "Reasoning bound reached without complete context");
        request.text.push_str(CONTINUATION_MARKER);
        request.context.force_stopped = true;
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RoutingMockProvider;
    use deliberate_core::message::ConversationId;
    use std::sync::Arc;

    const VERIFY: &str = "context verifier";
    const ANALYZE: &str = "skills analyst";
    const NEXT: &str = "next-step selector";

    const INCOMPLETE: &str = r#"{"is_complete": false, "missing_information": "the forecast"}"#;
    const COMPLETE: &str = r#"{"is_complete": true, "confidence_level": "High"}"#;

    fn advisor(provider: Arc<RoutingMockProvider>, max: usize) -> IterativeReasoningAdvisor {
        IterativeReasoningAdvisor::new(ModelInvoker::new(provider, "mock-model")).with_max_iterations(max)
    }

    fn request() -> AdvisedRequest {
        AdvisedRequest::new(ConversationId::from("c1"), "find today's weather in Paris")
    }

    #[tokio::test]
    async fn always_incomplete_runs_exactly_max_iterations_then_force_stops() {
        let provider = Arc::new(
            RoutingMockProvider::new()
                .route(VERIFY, INCOMPLETE)
                .route(ANALYZE, "needs web search")
                .route(NEXT, r#"{"summary": "search the forecast", "tool": "search"}"#),
        );
        let out = advisor(provider.clone(), 4).before(request()).await;

        assert_eq!(provider.calls(VERIFY), 4);
        assert_eq!(provider.calls(NEXT), 4);
        assert_eq!(out.context.iterations, 4);
        assert_eq!(out.context.action_log.len(), 4);
        assert!(out.context.force_stopped);
        assert!(out.text.ends_with(CONTINUATION_MARKER));
        assert_eq!(out.text.matches(CONTINUATION_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn analysis_runs_exactly_once() {
        for max in [1, 2, 4, 7] {
            let provider = Arc::new(RoutingMockProvider::new().route(VERIFY, INCOMPLETE).route(ANALYZE, "skills"));
            let out = advisor(provider.clone(), max).before(request()).await;
            assert_eq!(provider.calls(ANALYZE), 1, "max_iterations = {max}");
            assert!(out.context.analyzed);
            let notes = out
                .history
                .iter()
                .filter(|m| m.content.starts_with("Required skills and tools:"))
                .count();
            assert_eq!(notes, 1);
        }
    }

    #[tokio::test]
    async fn analysis_is_skipped_when_already_done() {
        let provider = Arc::new(RoutingMockProvider::new().route(VERIFY, INCOMPLETE).route(ANALYZE, "skills"));
        let mut req = request();
        req.context.analyzed = true;
        advisor(provider.clone(), 2).before(req).await;
        assert_eq!(provider.calls(ANALYZE), 0);
    }

    #[tokio::test]
    async fn complete_context_stops_early_and_leaves_request_unchanged() {
        let provider = Arc::new(RoutingMockProvider::new().script(VERIFY, &[INCOMPLETE, COMPLETE]));
        let out = advisor(provider.clone(), 4).before(request()).await;

        assert_eq!(provider.calls(VERIFY), 2);
        assert_eq!(provider.calls(NEXT), 1);
        assert_eq!(out.context.iterations, 2);
        assert!(!out.context.force_stopped);
        assert_eq!(out.text, "find today's weather in Paris");
        let verification = out.context.verification.unwrap();
        assert!(verification.is_complete);
        assert_eq!(verification.confidence_level, "High");
    }

    #[tokio::test]
    async fn complete_on_first_round_does_nothing_else() {
        let provider = Arc::new(RoutingMockProvider::new().route(VERIFY, COMPLETE));
        let out = advisor(provider.clone(), 4).before(request()).await;

        assert_eq!(provider.calls(ANALYZE), 0);
        assert_eq!(provider.calls(NEXT), 0);
        assert!(out.history.is_empty());
        assert!(out.context.action_log.is_empty());
        assert!(!out.context.analyzed);
    }

    #[tokio::test]
    async fn every_failure_still_terminates_with_defaults() {
        let provider = Arc::new(
            RoutingMockProvider::new()
                .failing(VERIFY)
                .failing(ANALYZE)
                .failing(NEXT),
        );
        let mut req = request();
        req.context.plan = Some(QueryPlan::empty("Weather in Paris today"));
        let out = advisor(provider.clone(), 3).before(req).await;

        assert_eq!(provider.calls(VERIFY), 3);
        assert_eq!(provider.calls(ANALYZE), 1);
        assert!(out.context.force_stopped);

        let verification = out.context.verification.unwrap();
        assert!(!verification.is_complete);
        assert!(verification.missing_information.starts_with("Verification failed:"));
        assert_eq!(verification.ambiguities, "No ambiguities");
        assert_eq!(verification.recommendations, "No recommendations");
        assert_eq!(verification.confidence_level, "Low");

        let step = out.context.next_step.unwrap();
        assert_eq!(step.summary, "Weather in Paris today");
        assert_eq!(out.context.action_log, vec!["Weather in Paris today"; 3]);
    }

    #[tokio::test]
    async fn next_step_prompt_sees_action_log_and_gaps() {
        let provider = Arc::new(
            RoutingMockProvider::new()
                .route(VERIFY, INCOMPLETE)
                .script(NEXT, &[r#"{"summary": "first action"}"#, r#"{"summary": "second action"}"#]),
        );
        advisor(provider.clone(), 2).before(request()).await;

        let next_prompts: Vec<String> = provider
            .requests()
            .into_iter()
            .filter(|r| r.messages[0].content.contains(NEXT))
            .map(|r| r.messages[1].content.clone())
            .collect();
        assert_eq!(next_prompts.len(), 2);
        assert!(next_prompts[0].contains("Missing: the forecast"));
        assert!(next_prompts[1].contains("1. first action"));
    }
}
