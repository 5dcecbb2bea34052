use serde::{ Deserialize, Serialize };

/// One unit produced by the orchestrator for an exchange.
///
/// Zero or more `Content` chunks are followed by exactly one terminal
/// chunk (`Done` or `Error`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamChunk {
    Content(String),
    Done,
    Error(String),
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamChunk::Content(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventType {
    Content,
    Error,
    Done,
}

/// JSON body of one event-stream `data:` line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}
