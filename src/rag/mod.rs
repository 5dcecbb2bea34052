use log::{ debug, warn };
use std::sync::Arc;

use crate::config::prompt::PromptConfig;
use crate::context::ContextSource;
use crate::error::ChatError;
use crate::history::ConversationStore;
use crate::models::chat::{ PromptPayload, PromptTurn, Role };

pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Builds the model payload for one user message: grounded system
/// instruction, the tail of the conversation, then the new message.
#[derive(Clone)]
pub struct PromptAssembler {
    store: Arc<ConversationStore>,
    source: Arc<dyn ContextSource>,
    prompts: Arc<PromptConfig>,
    max_history: usize,
}

impl PromptAssembler {
    pub fn new(
        store: Arc<ConversationStore>,
        source: Arc<dyn ContextSource>,
        prompts: Arc<PromptConfig>,
        max_history: usize
    ) -> Self {
        Self { store, source, prompts, max_history }
    }

    pub fn source(&self) -> &Arc<dyn ContextSource> {
        &self.source
    }

    pub fn prompts(&self) -> &PromptConfig {
        &self.prompts
    }

    /// Must run before the new user message is stored, otherwise it would
    /// show up twice in the payload.
    pub fn build(&self, user_message: &str, conversation_id: &str) -> Result<PromptPayload, ChatError> {
        let system = self.source.system_instruction(&self.prompts, user_message).map_err(|e| {
            warn!("Context source {} unavailable: {}", self.source.kind().as_str(), e);
            ChatError::ContextUnavailable(e.to_string())
        })?;

        let mut turns = self.store.recent_history(conversation_id, self.max_history);
        turns.push(PromptTurn {
            role: Role::User,
            content: user_message.to_string(),
        });

        debug!(
            "Assembled prompt for {}: {} system chars, {} history turns",
            conversation_id,
            system.len(),
            turns.len() - 1
        );
        Ok(PromptPayload { system, turns })
    }
}
