//! In-memory chat memory: conversation logs that live for the process lifetime.

use async_trait::async_trait;
use deliberate_core::error::MemoryError;
use deliberate_core::memory::ChatMemory;
use deliberate_core::message::{ConversationId, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

type Log = Arc<Mutex<Vec<Message>>>;

/// Stores each conversation in its own locked `Vec`.
///
/// The outer map lock is only held long enough to find or create a
/// conversation's log, so requests on different conversations never wait on
/// each other; requests on the same conversation serialize on its log.
pub struct InMemoryChatMemory {
    conversations: RwLock<HashMap<String, Log>>,
}

impl InMemoryChatMemory {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    async fn log(&self, conversation: &ConversationId) -> Log {
        if let Some(log) = self.conversations.read().await.get(conversation.as_str()) {
            return log.clone();
        }
        self.conversations
            .write()
            .await
            .entry(conversation.0.clone())
            .or_default()
            .clone()
    }

    /// Number of conversations with at least one lookup.
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for InMemoryChatMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn tail(messages: &[Message], limit: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(limit);
    messages[start..].to_vec()
}

#[async_trait]
impl ChatMemory for InMemoryChatMemory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, conversation: &ConversationId, message: Message) -> Result<(), MemoryError> {
        let log = self.log(conversation).await;
        log.lock().await.push(message);
        Ok(())
    }

    async fn get(&self, conversation: &ConversationId, limit: usize) -> Result<Vec<Message>, MemoryError> {
        let log = self.log(conversation).await;
        let messages = log.lock().await;
        Ok(tail(&messages, limit))
    }

    async fn append_and_get(
        &self,
        conversation: &ConversationId,
        message: Message,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        let log = self.log(conversation).await;
        let mut messages = log.lock().await;
        let history = tail(&messages, limit);
        messages.push(message);
        debug!(conversation = %conversation, stored = messages.len(), "Appended message");
        Ok(history)
    }

    async fn clear(&self, conversation: &ConversationId) -> Result<(), MemoryError> {
        self.conversations.write().await.remove(conversation.as_str());
        Ok(())
    }
}
