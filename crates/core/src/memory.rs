//! ChatMemory trait: per-conversation, append-only message history.
//!
//! Conversation state lives only for the lifetime of the process; backends
//! are free to keep it in memory.

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::message::{ConversationId, Message};

/// Append-only message log keyed by conversation.
///
/// Implementations must serialize operations on the **same** conversation
/// while letting different conversations proceed without contention.
#[async_trait]
pub trait ChatMemory: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Append one message to the conversation.
    async fn append(&self, conversation: &ConversationId, message: Message) -> Result<(), MemoryError>;

    /// Up to `limit` most recent messages, oldest first.
    async fn get(&self, conversation: &ConversationId, limit: usize) -> Result<Vec<Message>, MemoryError>;

    /// Append `message`, then read back up to `limit` messages that precede it,
    /// as one step that no other writer on the same conversation can interleave with.
    async fn append_and_get(
        &self,
        conversation: &ConversationId,
        message: Message,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Forget a conversation entirely.
    async fn clear(&self, conversation: &ConversationId) -> Result<(), MemoryError>;
}
