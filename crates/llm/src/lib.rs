//! Text generation for the voice dialogue engine
//!
//! Features:
//! - Conversation context cache (bounded, lazily expiring, LRU-evicting)
//! - OpenAI-compatible chat-completion backend
//! - `ConversationalGenerator`, the `TextGenerator` collaborator that ties
//!   the cache and the backend together under its own admission pool

pub mod backend;
pub mod cache;
pub mod generator;

pub use backend::{ChatMessage, ChatRole, LlmBackend, OpenAIBackend, OpenAIConfig};
pub use cache::ConversationCache;
pub use generator::ConversationalGenerator;

use thiserror::Error;
use voice_dialogue_core::GenerationError;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(msg) => GenerationError::RateLimited(msg),
            LlmError::Network(msg) => GenerationError::Connection(msg),
            LlmError::Timeout => GenerationError::Connection("request timed out".to_string()),
            LlmError::Authentication(msg) | LlmError::Configuration(msg) => {
                GenerationError::NotConfigured(msg)
            },
            LlmError::Api(msg) | LlmError::InvalidResponse(msg) => GenerationError::Api(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            GenerationError::from(LlmError::RateLimited("429".into())),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(GenerationError::from(LlmError::Timeout), GenerationError::Connection(_)));
        assert!(matches!(
            GenerationError::from(LlmError::Authentication("bad key".into())),
            GenerationError::NotConfigured(_)
        ));
        assert!(matches!(
            GenerationError::from(LlmError::InvalidResponse("no choices".into())),
            GenerationError::Api(_)
        ));
    }
}
