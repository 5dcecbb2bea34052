use crate::history::export::ParseExportFormatError;
use crate::history::HistoryError;
use crate::llm::ModelError;
use thiserror::Error;

pub const EMPTY_OUTPUT_APOLOGY: &str =
    "I apologize, but I couldn't generate a response. Please try again.";

/// Failures of one chat exchange or conversation operation.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limit exceeded for client {0}")]
    AdmissionDenied(String),
    #[error("conversation '{0}' not found")]
    ConversationNotFound(String),
    #[error("grounding context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("model backend is rate limited")]
    BackendRateLimited,
    #[error("model backend is unavailable")]
    BackendUnavailable,
    #[error("model backend failed")]
    BackendError,
    #[error(transparent)]
    InvalidExportFormat(#[from] ParseExportFormatError),
    #[error("model returned no output")]
    EmptyOutput,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ChatError {
    /// Text safe to show to a caller.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::AdmissionDenied(_) =>
                "Too many requests. Please wait a minute before sending another message.".to_string(),
            ChatError::ConversationNotFound(_) => "Conversation not found".to_string(),
            ChatError::ContextUnavailable(_) =>
                "The assistant's reference material is not available right now. Please try again later.".to_string(),
            ChatError::BackendRateLimited =>
                ModelError::RateLimited(String::new()).user_message().to_string(),
            ChatError::BackendUnavailable =>
                ModelError::BackendUnavailable(String::new()).user_message().to_string(),
            ChatError::BackendError => ModelError::Unknown(String::new()).user_message().to_string(),
            ChatError::InvalidExportFormat(e) => e.to_string(),
            ChatError::EmptyOutput => EMPTY_OUTPUT_APOLOGY.to_string(),
            ChatError::InvalidMessage(reason) => reason.clone(),
        }
    }
}

impl From<ModelError> for ChatError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::RateLimited(_) => ChatError::BackendRateLimited,
            ModelError::BackendUnavailable(_) => ChatError::BackendUnavailable,
            ModelError::MalformedPayload(_) | ModelError::Unknown(_) => ChatError::BackendError,
        }
    }
}

impl From<HistoryError> for ChatError {
    fn from(err: HistoryError) -> Self {
        ChatError::InvalidMessage(err.to_string())
    }
}
