//! The advisor chain.
//!
//! Advisors wrap the model call like layers of an onion:
//!
//! ```text
//! before(100) → before(200) → … → model call → … → after(200) → after(100)
//! ```
//!
//! Ordering is by [`Advisor::order`]; advisors with equal order keep their
//! registration order. For streamed calls the `before` hooks run once up
//! front and the `after` hooks run once, on the aggregated result, after the
//! last chunk.

use deliberate_core::error::{Error, ProviderError};
use deliberate_core::message::ConversationId;
use deliberate_core::provider::Provider;
use deliberate_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::advisor::Advisor;
use crate::envelope::{AdvisedRequest, AdvisedResponse};
use crate::stage::ModelStage;
use crate::stream_event::ChainStreamEvent;

pub struct AdvisorChain {
    advisors: Vec<Arc<dyn Advisor>>,
    stage: ModelStage,
    request_timeout: Option<Duration>,
}

impl AdvisorChain {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            advisors: Vec::new(),
            stage: ModelStage::new(provider, model),
            request_timeout: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.stage = self.stage.with_tools(tools);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.stage = self.stage.with_temperature(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.stage = self.stage.with_max_tokens(max);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.stage = self.stage.with_max_tool_rounds(rounds);
        self
    }

    /// Abort a whole `call` (advisors, model and tools) after `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Register an advisor.
    pub fn with_advisor(mut self, advisor: impl Advisor + 'static) -> Self {
        self.add(Arc::new(advisor));
        self
    }

    pub fn add(&mut self, advisor: Arc<dyn Advisor>) {
        self.advisors.push(advisor);
        // Stable: equal orders stay in registration order.
        self.advisors.sort_by_key(|a| a.order());
    }

    /// Advisor names in `before` order.
    pub fn advisor_names(&self) -> Vec<&str> {
        self.advisors.iter().map(|a| a.name()).collect()
    }

    /// A fresh request offering every registered tool.
    pub fn request(&self, conversation_id: ConversationId, query: impl Into<String>) -> AdvisedRequest {
        AdvisedRequest::new(conversation_id, query).with_tools(self.stage.tools().descriptors())
    }

    /// Run the request through every advisor and the model.
    pub async fn call(&self, request: AdvisedRequest) -> Result<AdvisedResponse, Error> {
        let conversation = request.conversation_id.clone();
        info!(conversation = %conversation, advisors = self.advisors.len(), "Handling request");

        let Some(timeout) = self.request_timeout else {
            return self.run(request).await;
        };
        match tokio::time::timeout(timeout, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(conversation = %conversation, timeout_secs = timeout.as_secs(), "Request timed out");
                Err(Error::Provider(ProviderError::Timeout(format!(
                    "request exceeded {}s",
                    timeout.as_secs()
                ))))
            }
        }
    }

    async fn run(&self, request: AdvisedRequest) -> Result<AdvisedResponse, Error> {
        let request = run_before(&self.advisors, request).await;
        let result = self.stage.complete(&request).await?;
        let response = AdvisedResponse {
            conversation_id: request.conversation_id,
            query: request.query,
            response: Some(result),
            context: request.context,
        };
        Ok(run_after(&self.advisors, response).await)
    }

    /// Streamed variant of [`call`](Self::call).
    ///
    /// The `before` hooks complete before this returns. Chunks, tool activity
    /// and a final [`ChainStreamEvent::Done`] arrive on the receiver. Dropping
    /// the receiver stops the model and tool loop at its next event.
    pub async fn stream(&self, request: AdvisedRequest) -> Result<mpsc::Receiver<ChainStreamEvent>, Error> {
        info!(conversation = %request.conversation_id, advisors = self.advisors.len(), "Handling streamed request");

        let request = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, run_before(&self.advisors, request))
                .await
                .map_err(|_| Error::Provider(ProviderError::Timeout(format!("advisors exceeded {}s", timeout.as_secs()))))?,
            None => run_before(&self.advisors, request).await,
        };

        let (tx, rx) = mpsc::channel(128);
        let advisors = self.advisors.clone();
        let stage = self.stage.clone();

        tokio::spawn(async move {
            let (result, tool_calls_made) = match stage.stream(&request, &tx).await {
                Ok(done) => done,
                Err(e) => {
                    warn!(conversation = %request.conversation_id, error = %e, "Streamed model call failed");
                    let _ = tx.send(ChainStreamEvent::Error { message: e.to_string() }).await;
                    return;
                }
            };

            let usage = result.usage.clone();
            let response = AdvisedResponse {
                conversation_id: request.conversation_id,
                query: request.query,
                response: Some(result),
                context: request.context,
            };
            let response = run_after(&advisors, response).await;

            let revised = response.response.as_ref().is_some_and(|r| r.results.len() > 1);
            let _ = tx
                .send(ChainStreamEvent::Done {
                    conversation_id: response.conversation_id.to_string(),
                    answer: response.final_text().map(str::to_string),
                    revised,
                    usage,
                    tool_calls_made,
                })
                .await;
        });

        Ok(rx)
    }
}

async fn run_before(advisors: &[Arc<dyn Advisor>], mut request: AdvisedRequest) -> AdvisedRequest {
    for advisor in advisors {
        debug!(advisor = advisor.name(), order = advisor.order(), "before");
        request = advisor.before(request).await;
    }
    request
}

async fn run_after(advisors: &[Arc<dyn Advisor>], mut response: AdvisedResponse) -> AdvisedResponse {
    for advisor in advisors.iter().rev() {
        debug!(advisor = advisor.name(), order = advisor.order(), "after");
        response = advisor.after(response).await;
    }
    response
}
