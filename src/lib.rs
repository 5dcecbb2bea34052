pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;

use agent::ChatOrchestrator;
use chrono::Utc;
use cli::Args;
use config::prompt::load_prompts;
use context::business::BusinessSource;
use context::document::DocumentSource;
use context::{ ContextKind, ContextSource };
use history::ConversationStore;
use llm::chat::{ new_client, StreamingModelClient };
use llm::{ LlmConfig, LlmType };
use log::{ debug, info, warn };
use rag::PromptAssembler;
use server::api::{ router, AppState, RouterOptions };
use server::rate_limit::RateLimiter;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("(provider default)"));
    info!("Context Source: {}", args.context_source);
    info!("Prompts Path: {}", args.prompts_path);
    info!("Max Conversation History: {}", args.max_conversation_history);
    info!("Max Message Length: {}", args.max_message_length);
    info!("Rate Limit: {} requests/minute per client", args.rate_limit_per_minute);
    info!("Trust X-Forwarded-For: {}", args.trust_forwarded_for);
    info!("Global Limit: {} requests/second", args.global_requests_per_second);
    info!("-------------------------");

    let prompts = load_prompts(Some(&args.prompts_path))?.with_names(
        &args.assistant_name,
        &args.business_name
    );

    let llm_type: LlmType = args.chat_llm_type.parse()?;
    let llm_config = LlmConfig {
        llm_type,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        timeout: Duration::from_secs(args.model_timeout_secs),
    };
    let model = StreamingModelClient::with_ready_ttl(
        new_client(&llm_config)?,
        Duration::from_secs(args.ready_check_ttl_secs)
    );
    info!("Chat model: {} ({})", model.model_name(), llm_type);

    let kind: ContextKind = args.context_source.parse()?;
    let configured =
        (llm_type == LlmType::Ollama || llm_config.api_key.is_some()) &&
        (kind != ContextKind::Document || !args.document_path.trim().is_empty());
    if !configured {
        warn!("Configuration is incomplete, check the API key and document path");
    }
    let (source, business): (Arc<dyn ContextSource>, Option<Arc<BusinessSource>>) = match kind {
        ContextKind::Document => {
            let document = DocumentSource::open(&args.document_path, args.document_title.clone());
            if !document.is_available() {
                warn!(
                    "Document {} could not be loaded, chat requests will fail until it is present",
                    args.document_path
                );
            }
            (Arc::new(document), None)
        }
        ContextKind::Business => {
            let business = Arc::new(
                BusinessSource::generate(args.business_event_count, args.business_seed)
            );
            (business.clone(), Some(business))
        }
    };

    let store = Arc::new(ConversationStore::new());
    let assembler = PromptAssembler::new(
        store.clone(),
        source,
        Arc::new(prompts),
        args.max_conversation_history
    );
    let orchestrator = ChatOrchestrator::new(store, assembler, model);
    let limiter = Arc::new(RateLimiter::per_minute(args.rate_limit_per_minute));

    spawn_eviction(
        orchestrator.clone(),
        limiter.clone(),
        chrono::Duration::hours(args.conversation_max_age_hours),
        Duration::from_secs(args.eviction_interval_secs.max(1))
    );

    let state = AppState {
        orchestrator,
        limiter,
        business,
        max_message_length: args.max_message_length,
        started_at: Utc::now(),
        trust_forwarded_for: args.trust_forwarded_for,
        configured,
    };
    let app = router(state, &RouterOptions {
        cors_origins: args.cors_origins.clone(),
        global_requests_per_second: args.global_requests_per_second,
    });

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, app, &args)?;
    server.run().await?;

    Ok(())
}

/// Periodically drops idle conversations, rate-limit windows and turn locks.
fn spawn_eviction(
    orchestrator: ChatOrchestrator,
    limiter: Arc<RateLimiter>,
    max_age: chrono::Duration,
    every: Duration
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let conversations = orchestrator.store().evict_older_than(max_age);
            let windows = limiter.prune();
            let locks = orchestrator.prune_turn_locks();
            debug!(
                "Eviction pass: {} conversations, {} rate windows, {} turn locks",
                conversations,
                windows,
                locks
            );
        }
    });
}
