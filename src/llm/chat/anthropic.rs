use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_generate, sse_data, ChatClient, CompletionResponse, LineEvent, TextStream };
use crate::llm::{ LlmConfig, LlmType, ModelError };
use crate::models::chat::PromptPayload;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub struct AnthropicChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct StreamPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl AnthropicChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| "Anthropic API key is required".to_string())?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key).map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let model = config.completion_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        info!("Anthropic chat client ready (model: {})", model);

        Ok(Self {
            http,
            model,
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn request<'a>(
        &'a self,
        payload: &'a PromptPayload,
        max_tokens: u32,
        stream: bool
    ) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            max_tokens,
            temperature: self.temperature,
            system: &payload.system,
            messages: payload.turns
                .iter()
                .map(|t| AnthropicMessage { role: t.role.as_str(), content: &t.content })
                .collect(),
            stream,
        }
    }
}

pub(crate) fn parse_stream_line(line: &str) -> LineEvent {
    // event: lines repeat the type that the data payload already carries
    let Some(data) = sse_data(line) else {
        return LineEvent::Skip;
    };
    let payload = match serde_json::from_str::<StreamPayload>(data) {
        Ok(p) => p,
        Err(e) => {
            debug!("Ignoring unparseable Anthropic event: {}", e);
            return LineEvent::Skip;
        }
    };

    match payload.event_type.as_str() {
        "content_block_delta" => match payload.delta {
            Some(delta) if delta.delta_type == "text_delta" && !delta.text.is_empty() =>
                LineEvent::Text(delta.text),
            _ => LineEvent::Skip,
        },
        "message_stop" => LineEvent::Done,
        "error" => {
            let (kind, message) = payload.error
                .map(|e| (e.error_type, e.message))
                .unwrap_or_default();
            let detail = format!("{}: {}", kind, message);
            let err = match kind.as_str() {
                "rate_limit_error" => ModelError::RateLimited(detail),
                "overloaded_error" | "api_error" => ModelError::BackendUnavailable(detail),
                "invalid_request_error" => ModelError::MalformedPayload(detail),
                _ => ModelError::Unknown(detail),
            };
            LineEvent::Failed(err)
        }
        _ => LineEvent::Skip,
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
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
            .json::<AnthropicResponse>().await
            .map_err(|e| ModelError::Unknown(format!("invalid Anthropic response: {}", e)))?;

        let response = data.content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<String>();
        Ok(CompletionResponse { response })
    }

    async fn stream_completion(&self, payload: &PromptPayload) -> Result<TextStream, ModelError> {
        let req = self.request(payload, self.max_tokens, true);
        let builder = self.http
            .post(self.url())
            .header("Accept", "text/event-stream")
            .json(&req);
        http_stream_generate(builder, parse_stream_line).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Anthropic
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
