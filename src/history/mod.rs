pub mod export;

use chrono::{ DateTime, Duration, Utc };
use log::{ debug, info };
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{ RwLock, RwLockReadGuard, RwLockWriteGuard };
use thiserror::Error;

use crate::models::chat::{ Conversation, ConversationSummary, Message, PromptTurn, Role };

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("message content is empty")]
    EmptyMessage,
}

#[derive(Debug)]
struct UsageCounters {
    conversations_created: u64,
    messages_appended: u64,
    characters_appended: u64,
    session_start: DateTime<Utc>,
}

impl UsageCounters {
    fn new() -> Self {
        Self {
            conversations_created: 0,
            messages_appended: 0,
            characters_appended: 0,
            session_start: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub conversations_active: usize,
    pub avg_messages_per_conversation: f64,
    /// Rough figure, four characters per token.
    pub estimated_tokens: u64,
    pub session_start: DateTime<Utc>,
    pub uptime_seconds: i64,
}

#[derive(Debug)]
struct StoreInner {
    conversations: HashMap<String, Conversation>,
    usage: UsageCounters,
}

/// In-memory registry of conversations, shared across requests.
///
/// Every method takes the lock for a short synchronous section and returns
/// owned snapshots, so nothing here is ever held across an `.await`.
#[derive(Debug)]
pub struct ConversationStore {
    inner: RwLock<StoreInner>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                conversations: HashMap::new(),
                usage: UsageCounters::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_or_create(&self, conversation_id: &str) -> Conversation {
        let mut inner = self.write();
        let StoreInner { conversations, usage } = &mut *inner;
        conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                usage.conversations_created += 1;
                info!("Created new conversation: {}", conversation_id);
                Conversation::new(conversation_id)
            })
            .clone()
    }

    pub fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<Message, HistoryError> {
        self.push(conversation_id, Message::new(role, content))
    }

    /// Like [`append`](Self::append) but keeps a caller-chosen message id.
    pub fn append_with_id(
        &self,
        conversation_id: &str,
        message_id: String,
        role: Role,
        content: &str
    ) -> Result<Message, HistoryError> {
        self.push(conversation_id, Message::with_id(message_id, role, content))
    }

    fn push(&self, conversation_id: &str, message: Message) -> Result<Message, HistoryError> {
        if message.content.trim().is_empty() {
            return Err(HistoryError::EmptyMessage);
        }
        let mut inner = self.write();
        let StoreInner { conversations, usage } = &mut *inner;
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                usage.conversations_created += 1;
                Conversation::new(conversation_id)
            });
        conversation.push(message.clone());
        usage.messages_appended += 1;
        usage.characters_appended += message.content.chars().count() as u64;
        debug!(
            "Appended {} message to {} ({} total)",
            message.role,
            conversation_id,
            conversation.message_count()
        );
        Ok(message)
    }

    pub fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.read().conversations.get(conversation_id).cloned()
    }

    /// Empties one conversation but keeps it registered. False if it never existed.
    pub fn clear(&self, conversation_id: &str) -> bool {
        let mut inner = self.write();
        match inner.conversations.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.clear_messages();
                info!("Cleared conversation: {}", conversation_id);
                true
            }
            None => false,
        }
    }

    /// Drops every conversation and restarts the usage counters.
    pub fn clear_all(&self) -> usize {
        let mut inner = self.write();
        let count = inner.conversations.len();
        inner.conversations.clear();
        inner.usage = UsageCounters::new();
        info!("Cleared all {} conversations", count);
        count
    }

    /// Oldest-first tail of at most `limit` messages.
    pub fn recent_history(&self, conversation_id: &str, limit: usize) -> Vec<PromptTurn> {
        let inner = self.read();
        let Some(conversation) = inner.conversations.get(conversation_id) else {
            return Vec::new();
        };
        let start = conversation.messages.len().saturating_sub(limit);
        conversation.messages[start..]
            .iter()
            .map(|m| PromptTurn { role: m.role, content: m.content.clone() })
            .collect()
    }

    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        self.evict_idle_since(Utc::now() - max_age)
    }

    fn evict_idle_since(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.write();
        let before = inner.conversations.len();
        inner.conversations.retain(|_, c| c.updated_at >= cutoff);
        let removed = before - inner.conversations.len();
        if removed > 0 {
            info!("Evicted {} idle conversations", removed);
        }
        removed
    }

    /// Most recently updated first.
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        let inner = self.read();
        let mut summaries: Vec<_> = inner.conversations
            .values()
            .map(Conversation::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    pub fn len(&self) -> usize {
        self.read().conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn usage(&self) -> UsageStats {
        let inner = self.read();
        let usage = &inner.usage;
        let now = Utc::now();
        UsageStats {
            total_conversations: usage.conversations_created,
            total_messages: usage.messages_appended,
            conversations_active: inner.conversations.len(),
            avg_messages_per_conversation: (usage.messages_appended as f64) /
            (usage.conversations_created.max(1) as f64),
            estimated_tokens: usage.characters_appended / 4,
            session_start: usage.session_start,
            uptime_seconds: (now - usage.session_start).num_seconds(),
        }
    }
}
