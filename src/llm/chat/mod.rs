pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod streaming;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmType, ModelError };
use crate::models::chat::PromptPayload;
use self::anthropic::AnthropicChatClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;

pub use self::streaming::StreamingModelClient;

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete_with_limit(
        &self,
        payload: &PromptPayload,
        max_tokens: u32
    ) -> Result<CompletionResponse, ModelError>;

    async fn stream_completion(&self, payload: &PromptPayload) -> Result<TextStream, ModelError>;

    async fn complete(&self, payload: &PromptPayload) -> Result<CompletionResponse, ModelError> {
        self.complete_with_limit(payload, self.max_tokens()).await
    }

    fn get_model(&self) -> String;
    fn llm_type(&self) -> LlmType;
    fn max_tokens(&self) -> u32;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Anthropic => {
            let specific_client = AnthropicChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// What a backend line parser made of one line of a streamed body.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Text(String),
    Done,
    Failed(ModelError),
    Skip,
}

/// Sends `request` and turns the streamed body into text fragments.
///
/// The body is split on `\n` across network chunks and each complete line is
/// handed to `line_parser`. A non-2xx status fails before any fragment is
/// produced. Dropping the returned stream stops the reader task, which drops
/// the response and aborts the backend request.
pub async fn http_stream_generate(
    request: reqwest::RequestBuilder,
    line_parser: fn(&str) -> LineEvent
) -> Result<TextStream, ModelError> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("Model backend returned HTTP {}", status);
        return Err(ModelError::from_status(status.as_u16(), &body));
    }

    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut bytes = resp.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(Err(ModelError::from(e))).await;
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim_end_matches(['\n', '\r']);
                if !dispatch_line(&tx, line_parser(line)).await {
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).to_string();
            dispatch_line(&tx, line_parser(line.trim_end_matches('\r'))).await;
        }
        debug!("Model stream reached end of body");
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

// false means the reader should stop
async fn dispatch_line(
    tx: &mpsc::Sender<Result<String, ModelError>>,
    event: LineEvent
) -> bool {
    match event {
        LineEvent::Text(text) => tx.send(Ok(text)).await.is_ok(),
        LineEvent::Done => false,
        LineEvent::Failed(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
        LineEvent::Skip => true,
    }
}

/// `data: ` payload of a server-sent-events line, if any.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim).filter(|d| !d.is_empty())
}
