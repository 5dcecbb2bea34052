use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const PREVIEW_LEN: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Role must be either 'user' or 'assistant', got '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), role, content)
    }

    pub fn with_id(message_id: String, role: Role, content: impl Into<String>) -> Self {
        Self {
            message_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only conversation owned by `ConversationStore`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.touch(message.timestamp);
        self.messages.push(message);
    }

    pub(crate) fn clear_messages(&mut self) {
        self.messages.clear();
        self.touch(Utc::now());
    }

    // updated_at never moves backwards even if the wall clock does
    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        let first_message_preview = self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| preview(&m.content));
        let last_message_preview = self.messages.last().map(|m| preview(&m.content));

        ConversationSummary {
            conversation_id: self.conversation_id.clone(),
            message_count: self.message_count(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            first_message_preview,
            last_message_preview,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

/// Full conversation body returned by `GET /api/conversations/{id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl From<Conversation> for ConversationDetail {
    fn from(conversation: Conversation) -> Self {
        let message_count = conversation.message_count();
        Self {
            conversation_id: conversation.conversation_id,
            messages: conversation.messages,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            message_count,
        }
    }
}

pub fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_LEN {
        let head: String = content.chars().take(PREVIEW_LEN).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

/// Exact payload handed to a model backend. Built per request, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptPayload {
    pub system: String,
    pub turns: Vec<PromptTurn>,
}

impl PromptPayload {
    pub fn history_len(&self) -> usize {
        self.turns.len().saturating_sub(1)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// A `ChatRequest` that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn validate(self, max_len: usize) -> Result<ValidChatRequest, String> {
        let message = self.message.trim();
        if message.is_empty() {
            return Err("Message cannot be empty or whitespace only".to_string());
        }
        let len = message.chars().count();
        if len > max_len {
            return Err(format!("Message is {} characters, the limit is {}", len, max_len));
        }
        let conversation_id = self.conversation_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(ValidChatRequest {
            message: message.to_string(),
            conversation_id,
        })
    }
}
