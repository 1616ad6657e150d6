//! The innermost stage of the chain: the model call and its tool loop.

use deliberate_core::error::{ProviderError, ToolError};
use deliberate_core::message::{Message, MessageToolCall};
use deliberate_core::provider::{Provider, ProviderRequest, Usage};
use deliberate_core::tool::{ToolCall, ToolRegistry, ToolResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::envelope::{AdvisedRequest, ChatResult, Generation};
use crate::stream_event::ChainStreamEvent;

/// Calls the model with the advised request and runs any tools it asks for.
#[derive(Clone)]
pub struct ModelStage {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_tool_rounds: usize,
}

impl ModelStage {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools: Arc::new(ToolRegistry::new()),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_tool_rounds: 8,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    fn provider_request(&self, request: &AdvisedRequest, messages: &[Message], offer_tools: bool) -> ProviderRequest {
        let mut out = ProviderRequest::new(self.model.clone(), messages.to_vec());
        out.temperature = self.temperature;
        out.max_tokens = self.max_tokens;
        if offer_tools {
            out.tools = request.tools.clone();
        }
        out
    }

    /// Tools are offered until `max_tool_rounds` rounds have run; the call
    /// after that must answer in text.
    fn offers_tools(&self, request: &AdvisedRequest, rounds: usize) -> bool {
        !request.tools.is_empty() && rounds < self.max_tool_rounds
    }

    /// Non-streaming model call.
    pub async fn complete(&self, request: &AdvisedRequest) -> Result<ChatResult, ProviderError> {
        let mut messages = initial_messages(request);
        let mut usage = Usage::default();
        let mut rounds = 0usize;

        loop {
            let offer_tools = self.offers_tools(request, rounds);
            let response = self
                .provider
                .complete(self.provider_request(request, &messages, offer_tools))
                .await?;
            if let Some(u) = &response.usage {
                usage = usage.add(u);
            }

            if response.message.tool_calls.is_empty() || !offer_tools {
                info!(model = %response.model, tool_rounds = rounds, "Model call completed");
                return Ok(ChatResult {
                    results: vec![Generation::new(response.message)],
                    model: response.model,
                    usage,
                });
            }

            rounds += 1;
            let calls = response.message.tool_calls.clone();
            messages.push(response.message);
            for call in &calls {
                let (output, _) = self.run_tool(call).await;
                messages.push(Message::tool_result(&call.id, output));
            }
        }
    }

    /// Streaming model call. Text deltas and tool activity are forwarded to
    /// `events`; the aggregated result and the number of tool calls made are
    /// returned once the model has finished.
    pub async fn stream(
        &self,
        request: &AdvisedRequest,
        events: &mpsc::Sender<ChainStreamEvent>,
    ) -> Result<(ChatResult, usize), ProviderError> {
        let mut messages = initial_messages(request);
        let mut usage = Usage::default();
        let mut rounds = 0usize;
        let mut tool_calls_made = 0usize;

        loop {
            let offer_tools = self.offers_tools(request, rounds);
            let mut provider_request = self.provider_request(request, &messages, offer_tools);
            provider_request.stream = true;
            let mut chunks = self.provider.stream(provider_request).await?;

            let mut content = String::new();
            let mut calls: Vec<MessageToolCall> = Vec::new();
            while let Some(chunk) = chunks.recv().await {
                let chunk = chunk?;
                if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                    content.push_str(&text);
                    send(events, ChainStreamEvent::Chunk { content: text }).await?;
                }
                for delta in chunk.tool_calls {
                    match calls.iter_mut().find(|c| c.id == delta.id) {
                        Some(existing) => existing.arguments.push_str(&delta.arguments),
                        None => calls.push(delta),
                    }
                }
                if let Some(u) = &chunk.usage {
                    usage = usage.add(u);
                }
            }

            let mut message = Message::assistant(content);
            if calls.is_empty() || !offer_tools {
                info!(model = %self.model, tool_rounds = rounds, "Streamed model call completed");
                return Ok((
                    ChatResult {
                        results: vec![Generation::new(message)],
                        model: self.model.clone(),
                        usage,
                    },
                    tool_calls_made,
                ));
            }

            rounds += 1;
            message.tool_calls = calls.clone();
            messages.push(message);
            for call in &calls {
                tool_calls_made += 1;
                send(
                    events,
                    ChainStreamEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null),
                    },
                )
                .await?;
                let (output, success) = self.run_tool(call).await;
                send(
                    events,
                    ChainStreamEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        output: output.clone(),
                        success,
                    },
                )
                .await?;
                messages.push(Message::tool_result(&call.id, output));
            }
        }
    }

    /// Run one tool call. Failures become the tool's output so the model can
    /// react to them.
    async fn run_tool(&self, call: &MessageToolCall) -> (String, bool) {
        match self.execute(call).await {
            Ok(result) => {
                debug!(tool = %call.name, success = result.success, "Tool executed");
                (result.output, result.success)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                (format!("Error: {e}"), false)
            }
        }
    }

    async fn execute(&self, call: &MessageToolCall) -> Result<ToolResult, ToolError> {
        let arguments = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };
        self.tools
            .execute(&ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments,
            })
            .await
    }
}

fn initial_messages(request: &AdvisedRequest) -> Vec<Message> {
    let mut messages = request.history.clone();
    messages.push(Message::user(request.text.clone()));
    messages
}

async fn send(events: &mpsc::Sender<ChainStreamEvent>, event: ChainStreamEvent) -> Result<(), ProviderError> {
    events
        .send(event)
        .await
        .map_err(|_| ProviderError::StreamInterrupted("stream receiver dropped".into()))
}
