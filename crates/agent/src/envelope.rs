//! Request and response envelopes threaded through the advisor chain.

use deliberate_core::message::{ConversationId, Message};
use deliberate_core::provider::Usage;
use deliberate_core::tool::ToolDescriptor;
use serde::{Deserialize, Serialize};

use crate::advice::{NextStepPlan, QueryPlan, VerificationSummary};

/// Per-request state shared by the advisors of one in-flight request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub plan: Option<QueryPlan>,
    pub next_step: Option<NextStepPlan>,
    pub verification: Option<VerificationSummary>,
    /// Chosen next actions, oldest first
    pub action_log: Vec<String>,
    /// Whether the required-skills analysis already ran
    pub analyzed: bool,
    /// Iterative reasoning rounds performed
    pub iterations: usize,
    /// The iteration bound was hit before verification succeeded
    pub force_stopped: bool,
}

/// A chat request on its way to the model.
#[derive(Debug, Clone)]
pub struct AdvisedRequest {
    pub conversation_id: ConversationId,
    /// The user's text as received
    pub query: String,
    /// The text that will be sent, as rewritten by advisors
    pub text: String,
    /// Messages sent ahead of `text`
    pub history: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub context: RequestContext,
}

impl AdvisedRequest {
    pub fn new(conversation_id: ConversationId, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            conversation_id,
            text: query.clone(),
            query,
            history: Vec::new(),
            tools: Vec::new(),
            context: RequestContext::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// One candidate answer.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub output: Option<Message>,
}

impl Generation {
    pub fn new(message: Message) -> Self {
        Self { output: Some(message) }
    }
}

/// Model output for one request. `results` is chronological; later
/// candidates supersede earlier ones.
#[derive(Debug, Clone, Default)]
pub struct ChatResult {
    pub results: Vec<Generation>,
    pub model: String,
    pub usage: Usage,
}

/// A chat response on its way back to the caller.
#[derive(Debug, Clone)]
pub struct AdvisedResponse {
    pub conversation_id: ConversationId,
    pub query: String,
    pub response: Option<ChatResult>,
    pub context: RequestContext,
}

impl AdvisedResponse {
    /// The latest candidate that has an output.
    pub fn final_message(&self) -> Option<&Message> {
        self.response
            .as_ref()?
            .results
            .iter()
            .rev()
            .find_map(|g| g.output.as_ref())
    }

    pub fn final_text(&self) -> Option<&str> {
        self.final_message().map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(results: Vec<Generation>) -> AdvisedResponse {
        AdvisedResponse {
            conversation_id: ConversationId::from("c1"),
            query: "q".into(),
            response: Some(ChatResult {
                results,
                ..Default::default()
            }),
            context: RequestContext::default(),
        }
    }

    #[test]
    fn new_request_sends_query_verbatim() {
        let request = AdvisedRequest::new(ConversationId::from("c1"), "hello");
        assert_eq!(request.text, "hello");
        assert_eq!(request.query, "hello");
        assert!(request.context.plan.is_none());
    }

    #[test]
    fn final_text_prefers_last_candidate_with_output() {
        let response = response_with(vec![
            Generation::new(Message::assistant("first")),
            Generation::new(Message::assistant("revised")),
            Generation { output: None },
        ]);
        assert_eq!(response.final_text(), Some("revised"));
    }

    #[test]
    fn final_text_absent_without_response() {
        let mut response = response_with(vec![]);
        assert_eq!(response.final_text(), None);
        response.response = None;
        assert_eq!(response.final_text(), None);
    }
}
