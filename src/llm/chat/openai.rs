use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_generate, sse_data, ChatClient, CompletionResponse, LineEvent, TextStream };
use crate::llm::{ LlmConfig, LlmType, ModelError };
use crate::models::chat::PromptPayload;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<OpenAIStreamError>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl OpenAIChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| "OpenAI API key is required".to_string())?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let model = config.completion_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        info!("OpenAI chat client ready (model: {})", model);

        Ok(Self {
            http,
            model,
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn request(&self, payload: &PromptPayload, max_tokens: u32, stream: bool) -> OpenAIChatRequest {
        let mut messages = Vec::with_capacity(payload.turns.len() + 1);
        if !payload.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: payload.system.clone(),
            });
        }
        messages.extend(
            payload.turns.iter().map(|t| OpenAIMessage {
                role: t.role.as_str().to_string(),
                content: t.content.clone(),
            })
        );

        OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens,
            stream: stream.then_some(true),
        }
    }
}

pub(crate) fn parse_stream_line(line: &str) -> LineEvent {
    let Some(data) = sse_data(line) else {
        return LineEvent::Skip;
    };
    if data == "[DONE]" {
        return LineEvent::Done;
    }
    let resp = match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(r) => r,
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            return LineEvent::Skip;
        }
    };
    if let Some(err) = resp.error {
        let detail = format!("{}: {}", err.error_type, err.message);
        return LineEvent::Failed(match err.error_type.as_str() {
            "rate_limit_exceeded" | "rate_limit_error" => ModelError::RateLimited(detail),
            "server_error" => ModelError::BackendUnavailable(detail),
            "invalid_request_error" => ModelError::MalformedPayload(detail),
            _ => ModelError::Unknown(detail),
        });
    }

    let mut text = String::new();
    let mut finished = false;
    for choice in resp.choices {
        if let Some(content) = choice.delta.content {
            text.push_str(&content);
        }
        if choice.finish_reason.is_some() {
            finished = true;
        }
    }
    if !text.is_empty() {
        // a trailing [DONE] still closes the stream
        LineEvent::Text(text)
    } else if finished {
        LineEvent::Done
    } else {
        LineEvent::Skip
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete_with_limit(
        &self,
        payload: &PromptPayload,
        max_tokens: u32
    ) -> Result<CompletionResponse, ModelError> {
        let req = self.request(payload, max_tokens, false);
        let resp = self.http.post(&self.base_url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), &body));
        }
        let data = resp
            .json::<OpenAIResponse>().await
            .map_err(|e| ModelError::Unknown(format!("invalid OpenAI response: {}", e)))?;

        let response = data.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(CompletionResponse { response })
    }

    async fn stream_completion(&self, payload: &PromptPayload) -> Result<TextStream, ModelError> {
        let req = self.request(payload, self.max_tokens, true);
        http_stream_generate(self.http.post(&self.base_url).json(&req), parse_stream_line).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::OpenAI
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
