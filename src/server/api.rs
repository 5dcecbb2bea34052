use crate::agent::ChatOrchestrator;
use crate::context::business::BusinessSource;
use crate::context::mock_data::format_money;
use crate::error::ChatError;
use crate::history::export::{ self, ExportFormat };
use crate::models::business::NewBid;
use crate::models::chat::{ ChatRequest, ConversationDetail };

use super::error::ApiError;
use super::rate_limit::{ flood_guard, global_limiter, ClientKey, RateLimiter, TrustForwardedFor };
use super::sse::{ event_stream, StreamEncoder };

use axum::{
    extract::{ FromRef, Path, Query, State },
    http::{ header, HeaderValue, StatusCode },
    middleware,
    response::{ sse::{ KeepAlive, Sse }, IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use chrono::{ DateTime, Utc };
use log::{ info, warn };
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{ AllowOrigin, Any, CorsLayer };
use tower_http::trace::TraceLayer;

/// Conversation used for every bid analysis.
pub const BID_ANALYSIS_SESSION: &str = "bid_analysis_session";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
    pub limiter: Arc<RateLimiter>,
    /// Set only when the business source is the active context.
    pub business: Option<Arc<BusinessSource>>,
    pub max_message_length: usize,
    pub started_at: DateTime<Utc>,
    pub trust_forwarded_for: bool,
    /// Startup settings the backend and context source need are present.
    pub configured: bool,
}

impl FromRef<AppState> for TrustForwardedFor {
    fn from_ref(state: &AppState) -> Self {
        TrustForwardedFor(state.trust_forwarded_for)
    }
}

pub struct RouterOptions {
    pub cors_origins: Vec<String>,
    pub global_requests_per_second: u32,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

pub fn router(state: AppState, options: &RouterOptions) -> Router {
    let limiter = Arc::new(global_limiter(options.global_requests_per_second));

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/conversations", get(list_conversations).delete(clear_all_conversations))
        .route("/api/conversations/{id}", get(get_conversation).delete(clear_conversation))
        .route("/api/conversations/{id}/export", get(export_conversation))
        .route("/api/usage/tokens", get(usage_handler))
        .route("/api/context-info", get(context_info_handler))
        .route("/api/business-metrics", get(business_metrics_handler))
        .route("/api/process-bid-document", post(process_bid_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/readiness", get(readiness_handler))
        .route("/ping", get(ping_handler))
        .route("/version", get(version_handler))
        .layer(middleware::from_fn_with_state(limiter, flood_guard))
        .layer(cors_layer(&options.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    ClientKey(client): ClientKey,
    Json(request): Json<ChatRequest>
) -> Result<Response, ApiError> {
    let request = request
        .validate(state.max_message_length)
        .map_err(ApiError::UnprocessableEntity)?;

    if !state.limiter.admit(&client) {
        warn!("Rate limit exceeded for {}", client);
        return Err(ChatError::AdmissionDenied(client).into());
    }

    let exchange = state.orchestrator.process_stream(&request.message, request.conversation_id).await?;
    info!("Streaming reply for conversation {}", exchange.conversation_id);

    let encoder = StreamEncoder::new(&exchange.conversation_id, &exchange.message_id);
    let events = event_stream(encoder, exchange.chunks);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

async fn list_conversations(State(state): State<AppState>) -> impl IntoResponse {
    let conversations = state.orchestrator.store().summaries();
    Json(json!({
        "total": conversations.len(),
        "conversations": conversations,
    }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<ConversationDetail>, ApiError> {
    let conversation = state.orchestrator
        .store()
        .get(&id)
        .ok_or(ChatError::ConversationNotFound(id))?;
    Ok(Json(conversation.into()))
}

async fn clear_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<impl IntoResponse, ApiError> {
    if !state.orchestrator.store().clear(&id) {
        return Err(ChatError::ConversationNotFound(id).into());
    }
    Ok(Json(json!({ "message": format!("Conversation {} cleared successfully", id) })))
}

async fn clear_all_conversations(State(state): State<AppState>) -> impl IntoResponse {
    let cleared = state.orchestrator.store().clear_all();
    Json(json!({
        "message": format!("Cleared {} conversations", cleared),
        "cleared": cleared,
    }))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn export_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>
) -> Result<Response, ApiError> {
    let format = query.format
        .as_deref()
        .unwrap_or("markdown")
        .parse::<ExportFormat>()
        .map_err(ChatError::from)?;

    let conversation = state.orchestrator
        .store()
        .get(&id)
        .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))?;

    let body = export::render(&conversation, format).map_err(|e| {
        warn!("Export of {} failed: {}", id, e);
        ApiError::Internal("Failed to export conversation".to_string())
    })?;

    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename={}", format.filename(&id))),
    ];
    Ok((headers, body).into_response())
}

async fn usage_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.store().usage())
}

async fn context_info_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let source = state.orchestrator.assembler().source();
    if !source.is_available() {
        return Err(ChatError::ContextUnavailable(source.kind().as_str().to_string()).into());
    }
    let stats = source.summary_stats().map_err(|e| {
        warn!("Context stats unavailable: {}", e);
        ApiError::from(ChatError::ContextUnavailable(e.to_string()))
    })?;
    Ok(Json(stats))
}

fn business_source(state: &AppState) -> Result<&Arc<BusinessSource>, ApiError> {
    state.business
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Business data is not enabled on this server".to_string()))
}

async fn business_metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(business_source(&state)?.dashboard_metrics()))
}

async fn process_bid_handler(
    State(state): State<AppState>,
    Json(form): Json<NewBid>
) -> Result<impl IntoResponse, ApiError> {
    let started = Instant::now();
    form.validate().map_err(ApiError::UnprocessableEntity)?;
    let business = business_source(&state)?;

    let bid = business.add_bid(&form);
    let assembler = state.orchestrator.assembler();
    assembler.source().refresh().map_err(|e| {
        warn!("Refresh after bid {} failed: {}", bid.bid_id, e);
        ApiError::from(ChatError::ContextUnavailable(e.to_string()))
    })?;
    info!("Added bid {} and refreshed business data", bid.bid_id);

    let total_cost = format_money(bid.total_cost);
    let room_rate = format!("{:.2}", bid.room_rate_per_night);
    let meeting_space = format_money(bid.meeting_space_cost);
    let rating = format!("{:.1}", bid.hotel_rating);
    let success_rate = format!("{:.1}", bid.success_rate);
    let prompt = assembler.prompts().bid_analysis_prompt(
        &[
            ("hotel_name", bid.hotel_name.as_str()),
            ("total_cost", total_cost.trim_start_matches('$')),
            ("room_rate", room_rate.as_str()),
            ("meeting_space_cost", meeting_space.trim_start_matches('$')),
            ("hotel_rating", rating.as_str()),
            ("success_rate", success_rate.as_str()),
        ]
    );

    // the bid is already recorded, so a model failure still answers 200
    let insights = match state.orchestrator.process(&prompt, BID_ANALYSIS_SESSION).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Bid analysis for {} failed: {}", bid.bid_id, e);
            e.user_message()
        }
    };

    Ok(
        Json(
            json!({
                "status": "success",
                "bidId": bid.bid_id,
                "extractedData": bid,
                "aiInsights": insights,
                "processingTime": started.elapsed().as_secs_f64(),
            })
        )
    )
}

struct Readiness {
    context: bool,
    model: bool,
}

async fn readiness(state: &AppState) -> Readiness {
    Readiness {
        context: state.orchestrator.assembler().source().is_available(),
        model: state.orchestrator.model().validate_ready().await,
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = readiness(&state).await;
    let status = match (ready.context, ready.model) {
        (true, true) => "healthy",
        (false, false) => "unhealthy",
        _ => "degraded",
    };
    let source = state.orchestrator.assembler().source().kind();
    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "contextSource": source.as_str(),
        "contextLoaded": ready.context,
        "modelAvailable": ready.model,
        "uptime": (Utc::now() - state.started_at).num_seconds(),
    }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = readiness(&state).await;
    let components = [ready.context, ready.model, state.configured];
    let status = if components.iter().all(|ok| *ok) {
        "healthy"
    } else if components.iter().any(|ok| *ok) {
        "degraded"
    } else {
        "unhealthy"
    };
    let source = state.orchestrator.assembler().source();
    let context_info = if ready.context { source.summary_stats().ok() } else { None };
    Json(json!({
        "appName": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "components": {
            "contextSource": ready.context,
            "modelBackend": ready.model,
            "configuration": state.configured,
        },
        "contextInfo": context_info,
    }))
}

async fn readiness_handler(State(state): State<AppState>) -> Response {
    let ready = readiness(&state).await;
    let timestamp = Utc::now().to_rfc3339();
    if ready.context && ready.model {
        return Json(json!({ "status": "ready", "timestamp": timestamp })).into_response();
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(
            json!({
                "status": "not_ready",
                "contextReady": ready.context,
                "modelReady": ready.model,
                "timestamp": timestamp,
            })
        ),
    ).into_response()
}

async fn ping_handler() -> impl IntoResponse {
    Json(json!({
        "message": "pong",
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::context::{ ContextSource, DocumentSource };
    use crate::history::ConversationStore;
    use crate::llm::chat::streaming::testing::ScriptedBackend;
    use crate::llm::chat::StreamingModelClient;
    use crate::llm::ModelError;
    use crate::rag::PromptAssembler;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use std::net::SocketAddr;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::io::Write;
    use tower::ServiceExt;

    fn document() -> Arc<dyn ContextSource> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Refunds are issued within 7 days.").unwrap();
        Arc::new(DocumentSource::open(file.path(), "Refund Policy"))
    }

    fn state_with(
        backend: Arc<ScriptedBackend>,
        source: Arc<dyn ContextSource>,
        business: Option<Arc<BusinessSource>>
    ) -> (AppState, Arc<ConversationStore>) {
        let store = Arc::new(ConversationStore::new());
        let assembler = PromptAssembler::new(
            store.clone(),
            source,
            Arc::new(PromptConfig::default()),
            10
        );
        let model = StreamingModelClient::new(backend);
        let state = AppState {
            orchestrator: ChatOrchestrator::new(store.clone(), assembler, model),
            limiter: Arc::new(RateLimiter::per_minute(10)),
            business,
            max_message_length: 2000,
            started_at: Utc::now(),
            trust_forwarded_for: false,
            configured: true,
        };
        (state, store)
    }

    fn options() -> RouterOptions {
        RouterOptions {
            cors_origins: Vec::new(),
            global_requests_per_second: 1000,
        }
    }

    fn app_with(
        backend: ScriptedBackend,
        source: Arc<dyn ContextSource>,
        business: Option<Arc<BusinessSource>>
    ) -> (Router, Arc<ConversationStore>) {
        let (state, store) = state_with(Arc::new(backend), source, business);
        (router(state, &options()), store)
    }

    fn app(backend: ScriptedBackend) -> (Router, Arc<ConversationStore>) {
        app_with(backend, document(), None)
    }

    fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
        ConnectInfo(format!("{}:40000", ip).parse().unwrap())
    }

    fn chat_request(body: Value, client: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .extension(peer(client))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn forwarded_chat_request(body: Value, client: &str, forwarded: &str) -> Request<Body> {
        let mut request = chat_request(body, client);
        request.headers_mut().insert("x-forwarded-for", HeaderValue::from_str(forwarded).unwrap());
        request
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn data_events(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn chat_streams_content_then_done() {
        let (app, store) = app(ScriptedBackend::fragments(&["Hel", "lo"]));
        let response = app
            .oneshot(chat_request(json!({ "message": "Refunds?", "conversationId": "s1" }), "1.1.1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream")
        );

        let events = data_events(&body_text(response).await);
        let types: Vec<_> = events.iter().map(|e| e["type"].as_str().unwrap().to_string()).collect();
        assert_eq!(types, vec!["content", "content", "done"]);
        assert_eq!(events[0]["content"], "Hel");
        assert_eq!(events[1]["content"], "lo");
        assert!(events.iter().all(|e| e["conversationId"] == "s1"));

        assert_eq!(store.get("s1").unwrap().messages[1].content, "Hello");
    }

    #[tokio::test]
    async fn chat_failure_mid_stream_ends_with_error_event() {
        let (app, store) = app(
            ScriptedBackend::failing_after(&["Par"], ModelError::Unknown("provider exploded".into()))
        );
        let response = app
            .oneshot(chat_request(json!({ "message": "Refunds?", "conversationId": "s2" }), "1.1.1.2"))
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(!body.contains("provider exploded"));

        let events = data_events(&body);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["content"], "Par");
        assert_eq!(events[1]["type"], "error");
        assert_eq!(store.get("s2").unwrap().message_count(), 1);
    }

    #[tokio::test]
    async fn eleventh_chat_request_is_rejected() {
        let (app, _) = app(ScriptedBackend::fragments(&["ok"]));
        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(chat_request(json!({ "message": "hi" }), "7.7.7.7"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(chat_request(json!({ "message": "hi" }), "7.7.7.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = app
            .oneshot(chat_request(json!({ "message": "hi" }), "8.8.8.8"))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rotating_forwarded_header_does_not_reset_the_limit() {
        let (app, _) = app(ScriptedBackend::fragments(&["ok"]));
        let mut admitted = 0;
        for i in 0..25 {
            let request = forwarded_chat_request(
                json!({ "message": "hi" }),
                "203.0.113.5",
                &format!("10.9.9.{}", i)
            );
            let response = app.clone().oneshot(request).await.unwrap();
            if response.status() == StatusCode::OK {
                admitted += 1;
            } else {
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn forwarded_header_keys_clients_when_trusted() {
        let (mut state, _) = state_with(
            Arc::new(ScriptedBackend::fragments(&["ok"])),
            document(),
            None
        );
        state.trust_forwarded_for = true;
        let app = router(state, &options());
        for i in 0..12 {
            let request = forwarded_chat_request(
                json!({ "message": "hi" }),
                "203.0.113.5",
                &format!("10.9.9.{}", i)
            );
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn blank_and_oversized_messages_are_rejected() {
        let (app, _) = app(ScriptedBackend::fragments(&["ok"]));
        let blank = app
            .clone()
            .oneshot(chat_request(json!({ "message": "   " }), "2.2.2.2"))
            .await
            .unwrap();
        assert_eq!(blank.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let long = app
            .oneshot(chat_request(json!({ "message": "x".repeat(2001) }), "2.2.2.2"))
            .await
            .unwrap();
        assert_eq!(long.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn chat_without_context_is_service_unavailable() {
        let missing: Arc<dyn ContextSource> = Arc::new(DocumentSource::new("/no/doc.txt", "Missing"));
        let (app, _) = app_with(ScriptedBackend::fragments(&["ok"]), missing, None);
        let response = app
            .clone()
            .oneshot(chat_request(json!({ "message": "hi" }), "3.3.3.3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let info = app.oneshot(get("/api/context-info")).await.unwrap();
        assert_eq!(info.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn export_validates_format_and_conversation() {
        let (app, store) = app(ScriptedBackend::fragments(&["ok"]));
        store.append("e1", crate::models::chat::Role::User, "hello").unwrap();

        let pdf = app.clone().oneshot(get("/api/conversations/e1/export?format=pdf")).await.unwrap();
        assert_eq!(pdf.status(), StatusCode::BAD_REQUEST);

        for (format, ext) in [("markdown", "md"), ("json", "json"), ("txt", "txt")] {
            let uri = format!("/api/conversations/e1/export?format={}", format);
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
            assert_eq!(disposition, format!("attachment; filename=conversation_e1.{}", ext));
        }

        let missing = app.oneshot(get("/api/conversations/nope/export?format=json")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn conversation_crud() {
        let (app, store) = app(ScriptedBackend::fragments(&["ok"]));
        store.append("a", crate::models::chat::Role::User, "first").unwrap();
        store.append("b", crate::models::chat::Role::User, "second").unwrap();

        let list: Value = serde_json
            ::from_str(&body_text(app.clone().oneshot(get("/api/conversations")).await.unwrap()).await)
            .unwrap();
        assert_eq!(list["total"], 2);

        let detail = app.clone().oneshot(get("/api/conversations/a")).await.unwrap();
        assert_eq!(detail.status(), StatusCode::OK);
        let missing = app.clone().oneshot(get("/api/conversations/zzz")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let delete = |uri: &str| Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap();
        let cleared = app.clone().oneshot(delete("/api/conversations/a")).await.unwrap();
        assert_eq!(cleared.status(), StatusCode::OK);
        assert_eq!(store.get("a").unwrap().message_count(), 0);
        let again = app.clone().oneshot(delete("/api/conversations/a")).await.unwrap();
        assert_eq!(again.status(), StatusCode::OK);
        let never = app.clone().oneshot(delete("/api/conversations/zzz")).await.unwrap();
        assert_eq!(never.status(), StatusCode::NOT_FOUND);

        let all: Value = serde_json
            ::from_str(&body_text(app.oneshot(delete("/api/conversations")).await.unwrap()).await)
            .unwrap();
        assert_eq!(all["cleared"], 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn usage_reports_counters() {
        let (app, store) = app(ScriptedBackend::fragments(&["ok"]));
        store.append("u", crate::models::chat::Role::User, "12345678").unwrap();
        let usage: Value = serde_json
            ::from_str(&body_text(app.oneshot(get("/api/usage/tokens")).await.unwrap()).await)
            .unwrap();
        assert_eq!(usage["totalConversations"], 1);
        assert_eq!(usage["totalMessages"], 1);
        assert_eq!(usage["estimatedTokens"], 2);
    }

    #[tokio::test]
    async fn bid_processing_needs_business_source() {
        let (app, _) = app(ScriptedBackend::fragments(&["ok"]));
        let request = Request::builder()
            .method("POST")
            .uri("/api/process-bid-document")
            .header("content-type", "application/json")
            .body(
                Body::from(
                    json!({ "hotel_name": "Hyatt Austin", "contact_person": "Kim Park", "total_cost": 42000, "room_rate": 199 }).to_string()
                )
            )
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn bid_processing_adds_bid_and_returns_insights() {
        let business = Arc::new(BusinessSource::generate(3, Some(9)));
        let before = business.snapshot().bids.len();
        let source: Arc<dyn ContextSource> = business.clone();
        let (app, store) = app_with(
            ScriptedBackend::fragments(&["Negotiate", " on price."]),
            source,
            Some(business.clone())
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/process-bid-document")
            .header("content-type", "application/json")
            .body(
                Body::from(
                    json!({ "hotel_name": "Hyatt Austin", "contact_person": "Kim Park", "total_cost": 42000, "room_rate": 199 }).to_string()
                )
            )
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["bidId"], "BID-NEW-001");
        assert_eq!(body["aiInsights"], "Negotiate on price.");
        assert_eq!(body["extractedData"]["hotelName"], "Hyatt Austin");

        assert_eq!(business.snapshot().bids.len(), before + 1);
        let session = store.get(BID_ANALYSIS_SESSION).unwrap();
        assert!(session.messages[0].content.contains("Hotel: Hyatt Austin"));
        assert!(session.messages[0].content.contains("Total Cost: $42,000"));

        let metrics = app.oneshot(get("/api/business-metrics")).await.unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bid_processing_with_model_down_still_records_bid_once() {
        let business = Arc::new(BusinessSource::generate(3, Some(9)));
        let before = business.snapshot().bids.len();
        let source: Arc<dyn ContextSource> = business.clone();
        let (app, _) = app_with(
            ScriptedBackend::unreachable(ModelError::BackendUnavailable("connection refused".into())),
            source,
            Some(business.clone())
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/process-bid-document")
            .header("content-type", "application/json")
            .body(
                Body::from(
                    json!({ "hotel_name": "Hyatt Austin", "contact_person": "Kim Park", "total_cost": 42000, "room_rate": 199 }).to_string()
                )
            )
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "success");
        let apology = ChatError::BackendUnavailable.user_message();
        assert_eq!(body["aiInsights"], apology.as_str());
        assert!(!body.to_string().contains("connection refused"));
        assert_eq!(business.snapshot().bids.len(), before + 1);
    }

    #[tokio::test]
    async fn repeated_health_checks_reach_the_model_once() {
        let backend = Arc::new(ScriptedBackend::fragments(&["ok"]));
        let (state, _) = state_with(backend.clone(), document(), None);
        let app = router(state, &options());

        for uri in ["/health", "/health", "/readiness", "/status", "/health"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn status_breaks_down_components() {
        let (mut state, _) = state_with(
            Arc::new(ScriptedBackend::fragments(&["ok"])),
            document(),
            None
        );
        state.configured = false;
        let app = router(state, &options());

        let status: Value = serde_json
            ::from_str(&body_text(app.oneshot(get("/status")).await.unwrap()).await)
            .unwrap();
        assert_eq!(status["status"], "degraded");
        assert_eq!(status["components"]["contextSource"], true);
        assert_eq!(status["components"]["modelBackend"], true);
        assert_eq!(status["components"]["configuration"], false);
        assert_eq!(status["contextInfo"]["title"], "Refund Policy");
        assert_eq!(status["contextInfo"]["counts"]["pages"], 1);
    }

    #[tokio::test]
    async fn health_reflects_context_and_model() {
        let (up, _) = app(ScriptedBackend::fragments(&["ok"]));
        let health: Value = serde_json
            ::from_str(&body_text(up.clone().oneshot(get("/health")).await.unwrap()).await)
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["contextSource"], "document");
        let ready = up.oneshot(get("/readiness")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        let (down, _) = app(ScriptedBackend::unreachable(ModelError::BackendUnavailable("x".into())));
        let health: Value = serde_json
            ::from_str(&body_text(down.clone().oneshot(get("/health")).await.unwrap()).await)
            .unwrap();
        assert_eq!(health["status"], "degraded");
        let ready = down.oneshot(get("/readiness")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn global_flood_guard_spares_probes() {
        let (state, _) = state_with(Arc::new(ScriptedBackend::fragments(&["ok"])), document(), None);
        let app = router(state, &RouterOptions { cors_origins: Vec::new(), global_requests_per_second: 1 });

        let first = app.clone().oneshot(get("/version")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(get("/version")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let ping = app.oneshot(get("/ping")).await.unwrap();
        assert_eq!(ping.status(), StatusCode::OK);
    }
}
