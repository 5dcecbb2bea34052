use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::chat::{ Conversation, Role };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Txt,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unsupported export format '{0}'. Use markdown, json or txt")]
pub struct ParseExportFormatError(String);

impl FromStr for ExportFormat {
    type Err = ParseExportFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            _ => Err(ParseExportFormatError(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        })
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }

    pub fn filename(&self, conversation_id: &str) -> String {
        let safe: String = conversation_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("conversation_{}.{}", safe, self.extension())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub messages: Vec<ExportedMessage>,
}

pub fn render(conversation: &Conversation, format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => render_json(conversation),
        ExportFormat::Markdown => Ok(render_markdown(conversation)),
        ExportFormat::Txt => Ok(render_txt(conversation)),
    }
}

fn render_json(conversation: &Conversation) -> Result<String, serde_json::Error> {
    let doc = ExportDocument {
        conversation_id: conversation.conversation_id.clone(),
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        message_count: conversation.message_count(),
        messages: conversation.messages
            .iter()
            .map(|m| ExportedMessage {
                role: m.role,
                content: m.content.clone(),
                timestamp: m.timestamp,
                message_id: m.message_id.clone(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc)
}

const STAMP: &str = "%Y-%m-%d %H:%M:%S";

fn render_markdown(conversation: &Conversation) -> String {
    let mut lines = vec![
        "# Conversation Export".to_string(),
        String::new(),
        format!("**Conversation ID:** {}", conversation.conversation_id),
        format!("**Created:** {}", conversation.created_at.format(STAMP)),
        format!("**Updated:** {}", conversation.updated_at.format(STAMP)),
        format!("**Messages:** {}", conversation.message_count()),
        String::new(),
        "---".to_string(),
        String::new()
    ];

    for msg in &conversation.messages {
        lines.push(format!("## **{}** ({})", msg.role.label(), msg.timestamp.format("%H:%M:%S")));
        lines.push(String::new());
        lines.push(msg.content.clone());
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn render_txt(conversation: &Conversation) -> String {
    let mut lines = vec![
        "Conversation Export".to_string(),
        "===================".to_string(),
        String::new(),
        format!("Conversation ID: {}", conversation.conversation_id),
        format!("Created: {}", conversation.created_at.format(STAMP)),
        format!("Updated: {}", conversation.updated_at.format(STAMP)),
        format!("Messages: {}", conversation.message_count()),
        String::new(),
        "Messages:".to_string(),
        "---------".to_string(),
        String::new()
    ];

    for (i, msg) in conversation.messages.iter().enumerate() {
        lines.push(format!("[{}] {} ({}):", i + 1, msg.role.label(), msg.timestamp.format("%H:%M:%S")));
        lines.push(msg.content.clone());
        lines.push(String::new());
        lines.push("-".repeat(50));
        lines.push(String::new());
    }

    lines.join("\n")
}
