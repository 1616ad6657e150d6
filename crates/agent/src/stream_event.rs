//! Events emitted by [`AdvisorChain::stream`](crate::chain::AdvisorChain::stream).

use deliberate_core::provider::Usage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainStreamEvent {
    /// Partial answer text from the model.
    Chunk { content: String },

    /// The model asked for a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// Emitted once, after every `after` hook has run. `answer` is the final
    /// candidate, which differs from the streamed text when a reviewer
    /// replaced it.
    Done {
        conversation_id: String,
        answer: Option<String>,
        revised: bool,
        usage: Usage,
        tool_calls_made: usize,
    },

    Error { message: String },
}

impl ChainStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
