//! Conversation memory around the chain.
//!
//! On the way in, the user's query is appended and the preceding messages are
//! read back in one step, bounded to the token budget and placed ahead of the
//! request history. On the way out, the final answer is appended.

use async_trait::async_trait;
use deliberate_core::memory::ChatMemory;
use deliberate_core::message::Message;
use deliberate_memory::{CharHeuristicEstimator, truncate};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::advisor::Advisor;
use crate::envelope::{AdvisedRequest, AdvisedResponse};

pub const ORDER: i32 = 100;

pub struct MemoryAdvisor {
    memory: Arc<dyn ChatMemory>,
    history_window: usize,
    token_budget: usize,
}

impl MemoryAdvisor {
    pub fn new(memory: Arc<dyn ChatMemory>) -> Self {
        Self {
            memory,
            history_window: 20,
            token_budget: 4096,
        }
    }

    pub fn with_history_window(mut self, messages: usize) -> Self {
        self.history_window = messages;
        self
    }

    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }
}

#[async_trait]
impl Advisor for MemoryAdvisor {
    fn name(&self) -> &str {
        "memory"
    }

    fn order(&self) -> i32 {
        ORDER
    }

    async fn before(&self, mut request: AdvisedRequest) -> AdvisedRequest {
        let past = match self
            .memory
            .append_and_get(&request.conversation_id, Message::user(request.query.clone()), self.history_window)
            .await
        {
            Ok(past) => past,
            Err(e) => {
                warn!(conversation = %request.conversation_id, error = %e, "Memory read failed, continuing without history");
                return request;
            }
        };

        let kept = truncate(&past, &CharHeuristicEstimator, self.token_budget);
        if kept.is_empty() && !past.is_empty() {
            warn!(
                conversation = %request.conversation_id,
                budget = self.token_budget,
                "No history fits the token budget, sending none"
            );
        }
        debug!(
            conversation = %request.conversation_id,
            read = past.len(),
            kept = kept.len(),
            "Loaded conversation history"
        );

        let mut history = kept;
        history.append(&mut request.history);
        request.history = history;
        request
    }

    async fn after(&self, response: AdvisedResponse) -> AdvisedResponse {
        let Some(answer) = response.final_text() else {
            return response;
        };
        if let Err(e) = self
            .memory
            .append(&response.conversation_id, Message::assistant(answer))
            .await
        {
            warn!(conversation = %response.conversation_id, error = %e, "Failed to store answer in memory");
        }
        response
    }
}
