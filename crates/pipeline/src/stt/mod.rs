//! Speech-to-Text backends
//!
//! The recognizer decodes whatever container the client uploaded, so the
//! coordinator never touches compressed audio.

mod http_backend;

pub use http_backend::{RemoteRecognizer, RemoteSttConfig};

use std::time::Duration;

use voice_dialogue_config::SttConfig;

impl From<&SttConfig> for RemoteSttConfig {
    fn from(config: &SttConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            max_concurrent: config.max_concurrent,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}
