use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Comma separated list of allowed CORS origins. Empty allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "")]
    pub cors_origins: Vec<String>,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (anthropic, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "anthropic")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., claude-3-5-sonnet-20241022, gpt-4o, llama3.1)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    #[arg(long, env = "MAX_TOKENS", default_value = "1500")]
    pub max_tokens: u32,

    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Per-call timeout for model backend requests, in seconds.
    #[arg(long, env = "MODEL_TIMEOUT_SECS", default_value = "120")]
    pub model_timeout_secs: u64,

    /// How long a backend readiness probe result is reused by /health, /readiness and /status.
    #[arg(long, env = "READY_CHECK_TTL_SECS", default_value = "30")]
    pub ready_check_ttl_secs: u64,

    // --- Grounding Args ---
    /// Grounding source for answers (document, business)
    #[arg(long, env = "CONTEXT_SOURCE", default_value = "document")]
    pub context_source: String,

    /// Pre-extracted UTF-8 text of the reference document, pages separated by form feeds.
    #[arg(long, env = "DOCUMENT_PATH", default_value = "data/document.txt")]
    pub document_path: String,

    #[arg(long, env = "DOCUMENT_TITLE", default_value = "Reference Document")]
    pub document_title: String,

    /// Number of events in the generated business snapshot.
    #[arg(long, env = "BUSINESS_EVENT_COUNT", default_value = "15")]
    pub business_event_count: usize,

    /// Fixed seed for the business snapshot generator. Random when unset.
    #[arg(long, env = "BUSINESS_SEED")]
    pub business_seed: Option<u64>,

    /// Path to the prompt template overrides (JSON). Built-in templates are used when missing.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    #[arg(long, env = "ASSISTANT_NAME", default_value = "AI Assistant")]
    pub assistant_name: String,

    #[arg(long, env = "BUSINESS_NAME", default_value = "Our company")]
    pub business_name: String,

    // --- Conversation Args ---
    /// Number of prior messages included in each model request.
    #[arg(long, env = "MAX_CONVERSATION_HISTORY", default_value = "10")]
    pub max_conversation_history: usize,

    #[arg(long, env = "MAX_MESSAGE_LENGTH", default_value = "2000")]
    pub max_message_length: usize,

    /// Conversations idle for longer than this are evicted.
    #[arg(long, env = "CONVERSATION_MAX_AGE_HOURS", default_value = "24")]
    pub conversation_max_age_hours: i64,

    #[arg(long, env = "EVICTION_INTERVAL_SECS", default_value = "600")]
    pub eviction_interval_secs: u64,

    // --- Rate Limit Args ---
    /// Chat requests admitted per client in any 60 second window.
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "10")]
    pub rate_limit_per_minute: usize,

    /// Key rate limits on the first X-Forwarded-For hop instead of the peer
    /// address. Only enable behind a proxy that overwrites the header.
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value = "false")]
    pub trust_forwarded_for: bool,

    /// Process-wide request ceiling across all endpoints.
    #[arg(long, env = "GLOBAL_REQUESTS_PER_SECOND", default_value = "50")]
    pub global_requests_per_second: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["grounded-chat"]).unwrap();
        assert_eq!(args.rate_limit_per_minute, 10);
        assert_eq!(args.max_conversation_history, 10);
        assert_eq!(args.max_message_length, 2000);
        assert_eq!(args.chat_llm_type, "anthropic");
        assert!(args.cors_origins.iter().all(|o| o.is_empty()));
        assert!(!args.trust_forwarded_for);
        assert_eq!(args.ready_check_ttl_secs, 30);
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let args = Args::try_parse_from([
            "grounded-chat",
            "--cors-origins",
            "http://localhost:3000,https://app.example.com",
        ]).unwrap();
        assert_eq!(args.cors_origins, vec!["http://localhost:3000", "https://app.example.com"]);
    }
}
