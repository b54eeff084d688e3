//! Per-conversation message history.
//!
//! Conversations are created lazily on first reference and hold the most
//! recent turns only. Each completed query appends exactly one user turn and
//! one assistant turn. Nothing expires a conversation except [`ConversationStore::clear`].

use std::collections::HashMap;

use async_trait::async_trait;
use capplan_core::errors::{ApplicationError, SourceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::llm::{Message, Role};

pub const DEFAULT_MAX_TURNS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }

    pub fn to_message(&self) -> Message {
        match self.role {
            Role::User => Message::user_text(self.text.clone()),
            Role::Assistant => Message::assistant_text(self.text.clone()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation store is unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(message) => Self::Collaborator(SourceError::Unavailable {
                source_name: "conversation store",
                message,
            }),
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Turns of `conversation_id`, oldest first; empty when unknown.
    async fn history(&self, conversation_id: &str) -> Result<Vec<Turn>, StoreError>;

    async fn append(&self, conversation_id: &str, turn: Turn) -> Result<(), StoreError>;

    /// Drops the oldest turns beyond the store's bound.
    async fn trim(&self, conversation_id: &str) -> Result<(), StoreError>;

    /// Removes the conversation; unknown ids are a no-op.
    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError>;

    async fn record_exchange(
        &self,
        conversation_id: &str,
        query: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        self.append(conversation_id, Turn::user(query)).await?;
        self.append(conversation_id, Turn::assistant(answer)).await?;
        self.trim(conversation_id).await
    }
}

pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<Turn>>>,
    max_turns: usize,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl InMemoryConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self { conversations: RwLock::new(HashMap::new()), max_turns }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn history(&self, conversation_id: &str) -> Result<Vec<Turn>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn append(&self, conversation_id: &str, turn: Turn) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(conversation_id.to_string()).or_default().push(turn);
        Ok(())
    }

    async fn trim(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        if let Some(turns) = conversations.get_mut(conversation_id) {
            let excess = turns.len().saturating_sub(self.max_turns);
            turns.drain(..excess);
        }
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationStore, InMemoryConversationStore, Turn};
    use crate::llm::Role;

    #[tokio::test]
    async fn unknown_conversations_are_empty() {
        let store = InMemoryConversationStore::default();
        assert!(store.history("missing").await.expect("history").is_empty());
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn history_keeps_the_most_recent_turns_in_order() {
        let store = InMemoryConversationStore::new(4);
        for index in 0..3 {
            store
                .record_exchange("conv", &format!("q{index}"), &format!("a{index}"))
                .await
                .expect("record");
        }

        let texts: Vec<String> = store
            .history("conv")
            .await
            .expect("history")
            .into_iter()
            .map(|turn| turn.text)
            .collect();
        assert_eq!(texts, vec!["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn trim_is_a_noop_below_the_bound() {
        let store = InMemoryConversationStore::default();
        store.append("conv", Turn::user("hello")).await.expect("append");
        store.trim("conv").await.expect("trim");

        let history = store.history("conv").await.expect("history");
        assert_eq!(history, vec![Turn { role: Role::User, text: "hello".to_string() }]);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = InMemoryConversationStore::default();
        store.record_exchange("conv", "q", "a").await.expect("record");

        store.clear("conv").await.expect("clear");
        store.clear("conv").await.expect("clear again");
        store.clear("never-seen").await.expect("clear unknown");

        assert!(store.history("conv").await.expect("history").is_empty());
    }

    #[test]
    fn turns_convert_to_model_messages() {
        let message = Turn::assistant("Ana is over-allocated.").to_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), "Ana is over-allocated.");
    }
}
