use crate::error::{ ChatError, EMPTY_OUTPUT_APOLOGY };
use crate::history::ConversationStore;
use crate::llm::chat::{ StreamingModelClient, TextStream };
use crate::models::chat::{ PromptPayload, Role };
use crate::models::stream::StreamChunk;
use crate::rag::PromptAssembler;

use futures::StreamExt;
use log::{ debug, info, warn };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use tokio::sync::{ mpsc, Mutex as TurnMutex, OwnedMutexGuard };
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// One streamed exchange handed back to the transport.
pub struct Exchange {
    pub conversation_id: String,
    /// Id the assistant message will be stored under if the exchange completes.
    pub message_id: String,
    pub chunks: ReceiverStream<StreamChunk>,
}

type TurnLocks = Arc<Mutex<HashMap<String, Arc<TurnMutex<()>>>>>;

/// Runs chat turns: resolves the conversation, records the user message,
/// grounds the prompt, calls the model and stores the finished answer.
///
/// Turns on the same conversation are serialized by a per-conversation lock
/// held for the whole exchange, streaming included.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<ConversationStore>,
    assembler: PromptAssembler,
    model: StreamingModelClient,
    turn_locks: TurnLocks,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        assembler: PromptAssembler,
        model: StreamingModelClient
    ) -> Self {
        Self {
            store,
            assembler,
            model,
            turn_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn assembler(&self) -> &PromptAssembler {
        &self.assembler
    }

    pub fn model(&self) -> &StreamingModelClient {
        &self.model
    }

    fn turn_lock(&self, conversation_id: &str) -> Arc<TurnMutex<()>> {
        self.turn_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Forgets locks nobody is holding or waiting on.
    pub fn prune_turn_locks(&self) -> usize {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Admitted -> ContextBuilt. The user message is stored even when the
    /// context cannot be built.
    async fn begin_turn(
        &self,
        message: &str,
        conversation_id: &str
    ) -> Result<(OwnedMutexGuard<()>, PromptPayload), ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::InvalidMessage("Message cannot be empty".to_string()));
        }

        let guard = self.turn_lock(conversation_id).lock_owned().await;
        debug!("[{}] Admitted", conversation_id);

        self.store.get_or_create(conversation_id);
        // history is read before the new message lands
        let built = self.assembler.build(message, conversation_id);
        self.store.append(conversation_id, Role::User, message)?;

        match built {
            Ok(payload) => {
                debug!("[{}] ContextBuilt ({} history turns)", conversation_id, payload.history_len());
                Ok((guard, payload))
            }
            Err(e) => {
                warn!("[{}] Failed: {}", conversation_id, e);
                Err(e)
            }
        }
    }

    /// Starts a streamed turn. Context failures are returned before any
    /// chunk is produced; everything after that arrives as chunks ending in
    /// exactly one `Done` or `Error`.
    pub async fn process_stream(
        &self,
        message: &str,
        conversation_id: Option<String>
    ) -> Result<Exchange, ChatError> {
        let conversation_id = conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let (guard, payload) = self.begin_turn(message, &conversation_id).await?;

        let message_id = Uuid::new_v4().to_string();
        let fragments = self.model.stream_complete(payload);
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(
            forward_stream(
                self.store.clone(),
                conversation_id.clone(),
                message_id.clone(),
                fragments,
                tx,
                guard
            )
        );

        Ok(Exchange {
            conversation_id,
            message_id,
            chunks: ReceiverStream::new(rx),
        })
    }

    /// Whole turn in one call. An empty model answer yields the apology
    /// text and stores nothing for the assistant.
    pub async fn process(&self, message: &str, conversation_id: &str) -> Result<String, ChatError> {
        let (_guard, payload) = self.begin_turn(message, conversation_id).await?;
        debug!("[{}] Streaming (single response)", conversation_id);

        let answer = self.model.complete(&payload).await.map_err(|e| {
            warn!("[{}] Failed: {}", conversation_id, e);
            ChatError::from(e)
        })?;

        if answer.trim().is_empty() {
            warn!("[{}] Failed: {}", conversation_id, ChatError::EmptyOutput);
            return Ok(EMPTY_OUTPUT_APOLOGY.to_string());
        }

        self.store.append(conversation_id, Role::Assistant, &answer)?;
        info!("[{}] Completed: {} characters", conversation_id, answer.len());
        Ok(answer)
    }
}

async fn forward_stream(
    store: Arc<ConversationStore>,
    conversation_id: String,
    message_id: String,
    mut fragments: TextStream,
    tx: mpsc::Sender<StreamChunk>,
    _turn: OwnedMutexGuard<()>
) {
    debug!("[{}] Streaming", conversation_id);
    let mut answer = String::new();

    while let Some(item) = fragments.next().await {
        match item {
            Ok(text) => {
                answer.push_str(&text);
                if tx.send(StreamChunk::Content(text)).await.is_err() {
                    // dropping `fragments` aborts the backend request
                    info!("[{}] Client disconnected, abandoning model stream", conversation_id);
                    return;
                }
            }
            Err(e) => {
                warn!(
                    "[{}] Failed after {} characters: {}",
                    conversation_id,
                    answer.len(),
                    e
                );
                let _ = tx.send(StreamChunk::Error(e.user_message().to_string())).await;
                return;
            }
        }
    }

    if answer.trim().is_empty() {
        warn!("[{}] Failed: {}", conversation_id, ChatError::EmptyOutput);
        if tx.send(StreamChunk::Content(EMPTY_OUTPUT_APOLOGY.to_string())).await.is_ok() {
            let _ = tx.send(StreamChunk::Done).await;
        }
        return;
    }

    match store.append_with_id(&conversation_id, message_id, Role::Assistant, &answer) {
        Ok(_) => info!("[{}] Completed: {} characters", conversation_id, answer.len()),
        Err(e) => warn!("[{}] Could not store assistant message: {}", conversation_id, e),
    }
    let _ = tx.send(StreamChunk::Done).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::context::{ ContextSource, DocumentSource };
    use crate::llm::chat::streaming::testing::ScriptedBackend;
    use crate::llm::ModelError;
    use std::io::Write;
    use std::time::Duration;

    fn loaded_source() -> Arc<dyn ContextSource> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Checked baggage allowance is two bags.").unwrap();
        Arc::new(DocumentSource::open(file.path(), "Baggage Guide"))
    }

    fn orchestrator_with(
        backend: ScriptedBackend,
        source: Arc<dyn ContextSource>
    ) -> (ChatOrchestrator, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let store = Arc::new(ConversationStore::new());
        let assembler = PromptAssembler::new(
            store.clone(),
            source,
            Arc::new(PromptConfig::default()),
            10
        );
        let model = StreamingModelClient::new(backend.clone());
        (ChatOrchestrator::new(store, assembler, model), backend)
    }

    fn orchestrator(backend: ScriptedBackend) -> (ChatOrchestrator, Arc<ScriptedBackend>) {
        orchestrator_with(backend, loaded_source())
    }

    #[tokio::test]
    async fn streams_fragments_then_done_and_stores_full_answer() {
        let (orch, _) = orchestrator(ScriptedBackend::fragments(&["Hel", "lo"]));
        let exchange = orch.process_stream("Hi there", Some("c1".into())).await.unwrap();
        let message_id = exchange.message_id.clone();

        let chunks: Vec<_> = exchange.chunks.collect().await;
        assert_eq!(chunks, vec![
            StreamChunk::Content("Hel".into()),
            StreamChunk::Content("lo".into()),
            StreamChunk::Done
        ]);

        let conv = orch.store().get("c1").unwrap();
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.messages[0].content, "Hi there");
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert_eq!(conv.messages[1].content, "Hello");
        assert_eq!(conv.messages[1].message_id, message_id);
    }

    #[tokio::test]
    async fn backend_failure_mid_stream_ends_with_error_and_stores_no_answer() {
        let err = ModelError::BackendUnavailable("socket reset".into());
        let (orch, _) = orchestrator(ScriptedBackend::failing_after(&["Par"], err.clone()));

        let exchange = orch.process_stream("Question", Some("c2".into())).await.unwrap();
        let chunks: Vec<_> = exchange.chunks.collect().await;
        assert_eq!(chunks, vec![
            StreamChunk::Content("Par".into()),
            StreamChunk::Error(err.user_message().to_string())
        ]);
        if let StreamChunk::Error(text) = &chunks[1] {
            assert!(!text.contains("socket reset"));
        }

        let conv = orch.store().get("c2").unwrap();
        assert_eq!(conv.message_count(), 1);
        assert_eq!(conv.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn empty_output_sends_apology_and_done_without_storing() {
        let (orch, _) = orchestrator(ScriptedBackend::fragments(&[]));
        let exchange = orch.process_stream("Anything?", None).await.unwrap();
        let conversation_id = exchange.conversation_id.clone();
        assert!(Uuid::parse_str(&conversation_id).is_ok());

        let chunks: Vec<_> = exchange.chunks.collect().await;
        assert_eq!(chunks, vec![
            StreamChunk::Content(EMPTY_OUTPUT_APOLOGY.into()),
            StreamChunk::Done
        ]);
        assert_eq!(orch.store().get(&conversation_id).unwrap().message_count(), 1);
    }

    #[tokio::test]
    async fn missing_context_fails_before_streaming_but_keeps_user_turn() {
        let source: Arc<dyn ContextSource> = Arc::new(DocumentSource::new("/no/such.txt", "Gone"));
        let (orch, backend) = orchestrator_with(ScriptedBackend::fragments(&["x"]), source);

        let result = orch.process_stream("Hello?", Some("c3".into())).await;
        assert!(matches!(result, Err(ChatError::ContextUnavailable(_))));
        assert_eq!(orch.store().get("c3").unwrap().message_count(), 1);
        assert!(backend.last_payload().is_none());
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (orch, _) = orchestrator(ScriptedBackend::fragments(&["x"]));
        let result = orch.process("   ", "c4").await;
        assert!(matches!(result, Err(ChatError::InvalidMessage(_))));
        assert!(orch.store().get("c4").is_none());
    }

    #[tokio::test]
    async fn process_returns_full_text_and_stores_both_turns() {
        let (orch, backend) = orchestrator(ScriptedBackend::fragments(&["Two ", "bags."]));
        let answer = orch.process("How many bags?", "c5").await.unwrap();
        assert_eq!(answer, "Two bags.");

        let conv = orch.store().get("c5").unwrap();
        assert_eq!(conv.message_count(), 2);
        let payload = backend.last_payload().unwrap();
        assert!(payload.system.contains("Checked baggage allowance"));
        assert_eq!(payload.turns.len(), 1);
    }

    #[tokio::test]
    async fn process_maps_backend_errors() {
        let (orch, _) = orchestrator(
            ScriptedBackend::unreachable(ModelError::RateLimited("429".into()))
        );
        let result = orch.process("Hi", "c6").await;
        assert!(matches!(result, Err(ChatError::BackendRateLimited)));
        assert_eq!(orch.store().get("c6").unwrap().message_count(), 1);
    }

    #[tokio::test]
    async fn turns_on_one_conversation_are_serialized() {
        let (orch, backend) = orchestrator(ScriptedBackend::fragments(&["Hel", "lo"]));
        let first = orch.process_stream("first", Some("c7".into())).await.unwrap();

        // the first exchange still holds the turn lock until its stream is drained
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            orch.process_stream("second", Some("c7".into()))
        ).await;
        assert!(blocked.is_err());

        let _: Vec<_> = first.chunks.collect().await;
        let second = orch.process_stream("second", Some("c7".into())).await.unwrap();
        let _: Vec<_> = second.chunks.collect().await;

        let history: Vec<_> = backend
            .last_payload()
            .unwrap()
            .turns.iter()
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(history, vec!["first", "Hello", "second"]);
        assert_eq!(orch.store().get("c7").unwrap().message_count(), 4);
    }

    #[tokio::test]
    async fn disconnect_stores_no_answer_and_releases_the_turn() {
        let (orch, _) = orchestrator(ScriptedBackend::fragments(&["Hel", "lo", " again"]));
        let mut exchange = orch.process_stream("first", Some("c8".into())).await.unwrap();
        assert_eq!(exchange.chunks.next().await, Some(StreamChunk::Content("Hel".into())));
        drop(exchange);

        let answer = tokio::time::timeout(Duration::from_secs(1), orch.process("second", "c8"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer, "Hello again");

        let roles: Vec<_> = orch.store().get("c8").unwrap().messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn idle_turn_locks_are_pruned() {
        let (orch, _) = orchestrator(ScriptedBackend::fragments(&["ok"]));
        orch.process("hi", "a").await.unwrap();
        orch.process("hi", "b").await.unwrap();
        assert_eq!(orch.prune_turn_locks(), 2);
        assert_eq!(orch.prune_turn_locks(), 0);
    }
}
