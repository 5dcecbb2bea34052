use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_generate, ChatClient, CompletionResponse, LineEvent, TextStream };
use crate::llm::{ LlmConfig, LlmType, ModelError };
use crate::models::chat::PromptPayload;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        let http = HttpClient::builder().timeout(config.timeout).build()?;
        let completion_model = config.completion_model
            .clone()
            .unwrap_or_else(|| "llama3.1".to_string());
        info!("Ollama chat client ready (model: {})", completion_model);

        Ok(Self {
            http,
            base_url: config.base_url.clone().unwrap_or_else(|| "http://localhost:11434".into()),
            completion_model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, payload: &PromptPayload, max_tokens: u32, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(payload.turns.len() + 1);
        if !payload.system.is_empty() {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: payload.system.clone(),
            });
        }
        for turn in &payload.turns {
            messages.push(OllamaMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }

        ChatRequest {
            model: self.completion_model.clone(),
            messages,
            stream,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: max_tokens,
            },
        }
    }
}

pub(crate) fn parse_stream_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(resp) => {
            if let Some(err) = resp.error {
                return LineEvent::Failed(ModelError::Unknown(err));
            }
            let content = resp.message.map(|m| m.content).unwrap_or_default();
            if !content.is_empty() {
                LineEvent::Text(content)
            } else if resp.done {
                LineEvent::Done
            } else {
                LineEvent::Skip
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete_with_limit(
        &self,
        payload: &PromptPayload,
        max_tokens: u32
    ) -> Result<CompletionResponse, ModelError> {
        let req = self.request(payload, max_tokens, false);
        let resp = self.http.post(self.url()).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), &body));
        }
        let data = resp
            .json::<ChatResponse>().await
            .map_err(|e| ModelError::Unknown(format!("invalid Ollama response: {}", e)))?;
        Ok(CompletionResponse { response: data.message.content })
    }

    async fn stream_completion(&self, payload: &PromptPayload) -> Result<TextStream, ModelError> {
        let req = self.request(payload, self.max_tokens, true);
        http_stream_generate(self.http.post(self.url()).json(&req), parse_stream_line).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Ollama
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
