//! Configuration management for the voice dialogue engine
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (VOICE_DIALOGUE prefix, `__` separator)
//!
//! Every section falls back to built-in defaults, so an empty configuration
//! directory yields a runnable (if unconfigured) server.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, ConversationConfig, LlmConfig, ObservabilityConfig,
    OrchestratorConfig, RuntimeEnvironment, ServerConfig, Settings, SttConfig, TtsConfig,
    WebSocketConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
