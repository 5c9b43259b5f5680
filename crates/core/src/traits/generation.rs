//! Text generation trait

use async_trait::async_trait;
use thiserror::Error;

use crate::ServiceHealth;

/// Classified generation failure
///
/// The category decides how the coordinator reports the fault; the message
/// carries the backend detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Reply generator with conversation memory
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    /// Whether credentials and endpoint are present
    fn configured(&self) -> bool;

    /// Generate a reply to `text` within the conversation `conversation_id`
    async fn generate(&self, text: &str, conversation_id: &str) -> Result<String, GenerationError>;

    /// Self-reported health
    fn health(&self) -> ServiceHealth;

    /// Model name for logging
    fn model_name(&self) -> &str {
        "unknown"
    }
}
