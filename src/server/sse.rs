use axum::response::sse::Event;
use futures::{ stream, Stream, StreamExt };
use log::warn;
use std::convert::Infallible;

use crate::llm::ModelError;
use crate::models::stream::{ StreamChunk, StreamEvent, StreamEventType };

/// Turns the chunks of one exchange into wire events.
#[derive(Debug, Clone)]
pub struct StreamEncoder {
    conversation_id: String,
    message_id: String,
}

impl StreamEncoder {
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }

    pub fn event(&self, chunk: &StreamChunk) -> StreamEvent {
        let (event_type, content, message_id) = match chunk {
            StreamChunk::Content(text) => (
                StreamEventType::Content,
                Some(text.clone()),
                Some(self.message_id.clone()),
            ),
            StreamChunk::Done => (StreamEventType::Done, None, Some(self.message_id.clone())),
            StreamChunk::Error(message) => (StreamEventType::Error, Some(message.clone()), None),
        };
        StreamEvent {
            event_type,
            content,
            conversation_id: self.conversation_id.clone(),
            message_id,
        }
    }

    pub fn encode(&self, chunk: &StreamChunk) -> String {
        serde_json::to_string(&self.event(chunk)).unwrap_or_default()
    }
}

/// Wire events for `chunks`, ending right after the first terminal chunk.
/// If the chunks run out without one, an error event is appended.
pub fn event_stream<S>(
    encoder: StreamEncoder,
    chunks: S
) -> impl Stream<Item = Result<Event, Infallible>> + Send
    where S: Stream<Item = StreamChunk> + Send + Unpin + 'static
{
    stream::unfold((chunks, encoder, false), |(mut chunks, encoder, finished)| async move {
        if finished {
            return None;
        }
        let chunk = match chunks.next().await {
            Some(chunk) => chunk,
            None => {
                warn!("Exchange {} ended without a terminal chunk", encoder.conversation_id);
                StreamChunk::Error(ModelError::Unknown(String::new()).user_message().to_string())
            }
        };
        let terminal = chunk.is_terminal();
        let event = Event::default().data(encoder.encode(&chunk));
        Some((Ok(event), (chunks, encoder, terminal)))
    })
}
