//! Shared test helpers for advisor and chain tests.

use deliberate_core::error::ProviderError;
use deliberate_core::message::{Message, MessageToolCall, Role};
use deliberate_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

enum Reply {
    /// Replies in order; the last one repeats.
    Script(Vec<String>),
    Fail,
}

struct Route {
    marker: String,
    reply: Reply,
    calls: usize,
}

/// A mock provider that routes advisor calls by their system prompt.
///
/// A request whose leading system message contains a route's marker gets
/// that route's reply. Everything else is treated as the main model call and
/// served from the `answers` queue, falling back to `"final answer"`.
pub struct RoutingMockProvider {
    routes: Mutex<Vec<Route>>,
    answers: Mutex<VecDeque<ProviderResponse>>,
    fail_model: bool,
    model_calls: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl RoutingMockProvider {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            answers: Mutex::new(VecDeque::new()),
            fail_model: false,
            model_calls: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer requests matching `marker` with `reply`.
    pub fn route(self, marker: &str, reply: &str) -> Self {
        self.script(marker, &[reply])
    }

    /// Answer requests matching `marker` with `replies` in order.
    pub fn script(self, marker: &str, replies: &[&str]) -> Self {
        self.push(marker, Reply::Script(replies.iter().map(|r| r.to_string()).collect()))
    }

    /// Fail every request matching `marker`.
    pub fn failing(self, marker: &str) -> Self {
        self.push(marker, Reply::Fail)
    }

    /// Queue main-model responses.
    pub fn answers(self, responses: Vec<ProviderResponse>) -> Self {
        self.answers.lock().unwrap().extend(responses);
        self
    }

    /// Fail every main-model call.
    pub fn failing_model(mut self) -> Self {
        self.fail_model = true;
        self
    }

    fn push(self, marker: &str, reply: Reply) -> Self {
        self.routes.lock().unwrap().push(Route {
            marker: marker.to_string(),
            reply,
            calls: 0,
        });
        self
    }

    /// How many requests matched `marker`.
    pub fn calls(&self, marker: &str) -> usize {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.marker == marker)
            .map(|r| r.calls)
            .sum()
    }

    /// How many requests reached the main model.
    pub fn model_calls(&self) -> usize {
        *self.model_calls.lock().unwrap()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for RoutingMockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Provider for RoutingMockProvider {
    fn name(&self) -> &str {
        "routing_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        let system = request
            .messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        {
            let mut routes = self.routes.lock().unwrap();
            if let Some(route) = routes.iter_mut().find(|r| !system.is_empty() && system.contains(&r.marker)) {
                route.calls += 1;
                return match &route.reply {
                    Reply::Fail => Err(ProviderError::ApiError {
                        status_code: 500,
                        message: format!("{} route is down", route.marker),
                    }),
                    Reply::Script(replies) => {
                        let index = (route.calls - 1).min(replies.len().saturating_sub(1));
                        Ok(make_text_response(replies.get(index).map(String::as_str).unwrap_or("")))
                    }
                };
            }
        }

        *self.model_calls.lock().unwrap() += 1;
        if self.fail_model {
            return Err(ProviderError::Network("connection reset".into()));
        }
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| make_text_response("final answer")))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response requesting tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
