pub mod chat;

use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Anthropic,
    OpenAI,
    Ollama,
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::Anthropic => "anthropic",
            LlmType::OpenAI => "openai",
            LlmType::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid LLM type: '{0}'")]
pub struct ParseLlmTypeError(String);

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(LlmType::Anthropic),
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            _ => Err(ParseLlmTypeError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Anthropic,
            api_key: None,
            completion_model: None,
            base_url: None,
            max_tokens: 1500,
            temperature: 0.7,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Recoverable failures reported by a model backend.
///
/// The carried string is internal detail for logs. Callers only ever see
/// [`ModelError::user_message`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("backend rate limited: {0}")]
    RateLimited(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("unknown backend failure: {0}")]
    Unknown(String),
}

impl ModelError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ModelError::RateLimited(_) =>
                "I'm receiving a lot of requests right now. Please wait a moment and try again.",
            ModelError::BackendUnavailable(_) =>
                "I'm experiencing technical difficulties. Please try again.",
            ModelError::MalformedPayload(_) => "I couldn't process that request. Please try again.",
            ModelError::Unknown(_) => "I encountered an unexpected error. Please try again.",
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, body);
        match status {
            429 => ModelError::RateLimited(detail),
            // 529 is Anthropic's "overloaded"
            500..=599 => ModelError::BackendUnavailable(detail),
            400 | 413 | 422 => ModelError::MalformedPayload(detail),
            _ => ModelError::Unknown(detail),
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ModelError::from_status(status.as_u16(), &err.to_string());
        }
        if err.is_timeout() || err.is_connect() {
            ModelError::BackendUnavailable(err.to_string())
        } else if err.is_builder() {
            ModelError::MalformedPayload(err.to_string())
        } else {
            ModelError::Unknown(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_llm_type_case_insensitively() {
        assert_eq!("Anthropic".parse::<LlmType>().unwrap(), LlmType::Anthropic);
        assert_eq!(" openai ".parse::<LlmType>().unwrap(), LlmType::OpenAI);
        assert!("gemini".parse::<LlmType>().is_err());
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert!(matches!(ModelError::from_status(429, ""), ModelError::RateLimited(_)));
        assert!(matches!(ModelError::from_status(503, ""), ModelError::BackendUnavailable(_)));
        assert!(matches!(ModelError::from_status(529, ""), ModelError::BackendUnavailable(_)));
        assert!(matches!(ModelError::from_status(400, ""), ModelError::MalformedPayload(_)));
        assert!(matches!(ModelError::from_status(401, ""), ModelError::Unknown(_)));
    }

    #[test]
    fn user_message_never_leaks_detail() {
        let err = ModelError::Unknown("x-api-key rejected by provider".into());
        assert!(!err.user_message().contains("x-api-key"));
    }
}
