use futures::{ future, stream, StreamExt };
use log::{ error, info, warn };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ ChatClient, TextStream };
use crate::llm::ModelError;
use crate::models::chat::{ PromptPayload, PromptTurn, Role };

const PROBE_MAX_TOKENS: u32 = 5;
pub const DEFAULT_READY_TTL: Duration = Duration::from_secs(30);

/// Backend-agnostic model access used by the orchestrator.
///
/// Streams produced here only carry non-empty fragments and end either
/// normally or with exactly one `Err`, never anything after it.
#[derive(Clone)]
pub struct StreamingModelClient {
    backend: Arc<dyn ChatClient>,
    ready_ttl: Duration,
    // last probe time and outcome
    last_probe: Arc<Mutex<Option<(Instant, bool)>>>,
}

impl StreamingModelClient {
    pub fn new(backend: Arc<dyn ChatClient>) -> Self {
        Self::with_ready_ttl(backend, DEFAULT_READY_TTL)
    }

    pub fn with_ready_ttl(backend: Arc<dyn ChatClient>, ready_ttl: Duration) -> Self {
        Self {
            backend,
            ready_ttl,
            last_probe: Arc::new(Mutex::new(None)),
        }
    }

    pub fn model_name(&self) -> String {
        self.backend.get_model()
    }

    pub async fn complete(&self, payload: &PromptPayload) -> Result<String, ModelError> {
        match self.backend.complete(payload).await {
            Ok(resp) => {
                info!("Generated response: {} characters", resp.response.len());
                Ok(resp.response)
            }
            Err(e) => {
                error!("Model completion failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn stream_complete(&self, payload: PromptPayload) -> TextStream {
        let backend = self.backend.clone();
        let opened = async move { backend.stream_completion(&payload).await };

        let fragments = stream::once(opened)
            .flat_map(|result| match result {
                Ok(s) => s,
                Err(e) => Box::pin(stream::iter(vec![Err(e)])) as TextStream,
            })
            .filter(|item| future::ready(!matches!(item, Ok(text) if text.is_empty())))
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                if let Err(e) = &item {
                    error!("Model stream failed: {}", e);
                    *failed = true;
                }
                future::ready(Some(item))
            });

        Box::pin(fragments)
    }

    /// Minimal round trip to confirm the backend is reachable and accepts our credentials.
    ///
    /// The outcome is reused for `ready_ttl`, so at most one probe reaches the
    /// backend per interval no matter how often this is called.
    pub async fn validate_ready(&self) -> bool {
        let mut last = self.last_probe.lock().await;
        if let Some((at, ready)) = *last {
            if at.elapsed() < self.ready_ttl {
                return ready;
            }
        }
        let ready = self.probe_backend().await;
        *last = Some((Instant::now(), ready));
        ready
    }

    async fn probe_backend(&self) -> bool {
        let probe = PromptPayload {
            system: String::new(),
            turns: vec![PromptTurn { role: Role::User, content: "Hello".to_string() }],
        };
        match self.backend.complete_with_limit(&probe, PROBE_MAX_TOKENS).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Model backend validation failed: {}", e);
                false
            }
        }
    }
}
