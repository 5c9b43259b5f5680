//! Conversational text generator
//!
//! Implements `TextGenerator` on top of an `LlmBackend`:
//! validate → record user turn → build prompt from history → call backend
//! under the generator's own permit pool → record assistant turn.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;

use voice_dialogue_config::LlmConfig;
use voice_dialogue_core::{GenerationError, ServiceHealth, TextGenerator, TurnRole};

use crate::backend::{ChatMessage, ChatRole, LlmBackend};
use crate::cache::ConversationCache;

/// `TextGenerator` backed by a chat model and the conversation cache
pub struct ConversationalGenerator {
    backend: Arc<dyn LlmBackend>,
    cache: Arc<ConversationCache>,
    permits: Semaphore,
    max_concurrent: usize,
    system_prompt: String,
    max_message_length: usize,
    last_error: Mutex<Option<String>>,
}

impl ConversationalGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>, cache: Arc<ConversationCache>, config: &LlmConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            backend,
            cache,
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            system_prompt: config.system_prompt.clone(),
            max_message_length: config.max_message_length,
            last_error: Mutex::new(None),
        }
    }

    /// Shared conversation cache
    pub fn cache(&self) -> &Arc<ConversationCache> {
        &self.cache
    }

    fn validate(&self, text: &str) -> Result<String, GenerationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::InvalidInput("Message must not be empty".to_string()));
        }
        let length = trimmed.chars().count();
        if length > self.max_message_length {
            return Err(GenerationError::InvalidInput(format!(
                "Message too long ({} > {} characters)",
                length, self.max_message_length
            )));
        }
        Ok(trimmed.to_string())
    }

    fn build_messages(&self, turns: &[voice_dialogue_core::DialogueTurn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.extend(turns.iter().map(|turn| ChatMessage {
            role: match turn.role {
                TurnRole::User => ChatRole::User,
                TurnRole::Assistant => ChatRole::Assistant,
            },
            content: turn.content.clone(),
        }));
        messages
    }
}

#[async_trait]
impl TextGenerator for ConversationalGenerator {
    fn configured(&self) -> bool {
        self.backend.is_configured()
    }

    async fn generate(&self, text: &str, conversation_id: &str) -> Result<String, GenerationError> {
        if !self.configured() {
            return Err(GenerationError::NotConfigured("LLM API key is not set".to_string()));
        }

        let message = self.validate(text)?;
        let record = self.cache.append_turn(conversation_id, TurnRole::User, &message);
        let messages = self.build_messages(&record.turns);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GenerationError::Api("generator is shutting down".to_string()))?;

        match self.backend.chat(&messages).await {
            Ok(reply) => {
                *self.last_error.lock() = None;
                self.cache.append_turn(conversation_id, TurnRole::Assistant, &reply);
                tracing::debug!(
                    conversation_id = %conversation_id,
                    history_turns = record.len(),
                    "Reply generated"
                );
                Ok(reply)
            },
            Err(e) => {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "Generation failed");
                *self.last_error.lock() = Some(e.to_string());
                Err(e.into())
            },
        }
    }

    fn health(&self) -> ServiceHealth {
        let base = if !self.configured() {
            ServiceHealth::unhealthy().with_detail("reason", "API key not configured")
        } else if let Some(err) = self.last_error.lock().clone() {
            ServiceHealth::degraded().with_detail("last_error", err)
        } else {
            ServiceHealth::healthy()
        };

        base.with_detail("model", self.backend.model_name())
            .with_detail("active_conversations", self.cache.count())
            .with_detail("available_permits", self.permits.available_permits())
            .with_detail("max_concurrent", self.max_concurrent)
    }

    fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LlmError;
    use std::time::Duration;
    use voice_dialogue_core::HealthStatus;

    /// Echoes the number of messages it saw, or fails with a preset error
    struct ScriptedBackend {
        configured: bool,
        fail: Mutex<Option<LlmError>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedBackend {
        fn new(configured: bool) -> Self {
            Self { configured, fail: Mutex::new(None), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.seen.lock().push(messages.to_vec());
            if let Some(err) = self.fail.lock().take() {
                return Err(err);
            }
            Ok(format!("reply to {} messages", messages.len()))
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn generator(backend: Arc<ScriptedBackend>) -> ConversationalGenerator {
        let cache = Arc::new(ConversationCache::new(20, 100, Duration::from_secs(3600)));
        let config = LlmConfig {
            system_prompt: "be brief".to_string(),
            max_message_length: 10,
            ..LlmConfig::default()
        };
        ConversationalGenerator::new(backend, cache, &config)
    }

    #[tokio::test]
    async fn test_generate_records_both_turns() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let gen = generator(backend.clone());

        let reply = gen.generate("  hello ", "c1").await.unwrap();
        assert_eq!(reply, "reply to 2 messages");

        let record = gen.cache().get("c1").unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.turns[0].content, "hello");
        assert_eq!(record.turns[1].role, TurnRole::Assistant);

        // History is replayed on the next turn
        gen.generate("again", "c1").await.unwrap();
        let seen = backend.seen.lock();
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][0].role, ChatRole::System);
    }

    #[tokio::test]
    async fn test_input_validation() {
        let gen = generator(Arc::new(ScriptedBackend::new(true)));
        assert!(matches!(gen.generate("   ", "c1").await, Err(GenerationError::InvalidInput(_))));
        assert!(matches!(
            gen.generate("this message is too long", "c1").await,
            Err(GenerationError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let gen = generator(Arc::new(ScriptedBackend::new(false)));
        assert!(!gen.configured());
        assert!(matches!(gen.generate("hi", "c1").await, Err(GenerationError::NotConfigured(_))));
        assert_eq!(gen.health().status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_failure_degrades_health_until_success() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let gen = generator(backend.clone());
        assert_eq!(gen.health().status, HealthStatus::Healthy);

        *backend.fail.lock() = Some(LlmError::RateLimited("slow down".into()));
        assert!(matches!(gen.generate("hi", "c1").await, Err(GenerationError::RateLimited(_))));
        assert_eq!(gen.health().status, HealthStatus::Degraded);

        gen.generate("hi", "c1").await.unwrap();
        assert_eq!(gen.health().status, HealthStatus::Healthy);
    }
}
