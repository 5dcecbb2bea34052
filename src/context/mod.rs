pub mod business;
pub mod document;
pub mod mock_data;

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

use crate::config::prompt::PromptConfig;

pub use self::business::BusinessSource;
pub use self::document::DocumentSource;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context source not loaded: {0}")]
    NotLoaded(String),
    #[error("document '{0}' contains no text")]
    EmptyDocument(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub source: &'static str,
    pub title: String,
    pub counts: BTreeMap<String, usize>,
}

/// Supplies the grounding material a model answer must stay within.
///
/// One implementation is chosen at startup and shared by every request.
pub trait ContextSource: Send + Sync {
    fn kind(&self) -> ContextKind;

    fn grounding_text(&self) -> Result<String, ContextError>;

    fn summary_stats(&self) -> Result<ContextStats, ContextError>;

    /// Full system instruction for one user message, identity directive included.
    fn system_instruction(
        &self,
        prompts: &PromptConfig,
        user_message: &str
    ) -> Result<String, ContextError>;

    /// Re-reads or rebuilds the underlying material.
    fn refresh(&self) -> Result<(), ContextError>;

    fn is_available(&self) -> bool {
        self.grounding_text().map(|t| !t.trim().is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Document,
    Business,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Document => "document",
            ContextKind::Business => "business",
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid context source '{0}', expected 'document' or 'business'")]
pub struct ParseContextKindError(String);

impl FromStr for ContextKind {
    type Err = ParseContextKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "document" | "pdf" => Ok(ContextKind::Document),
            "business" => Ok(ContextKind::Business),
            _ => Err(ParseContextKindError(s.to_string())),
        }
    }
}
