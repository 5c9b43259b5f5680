//! Text-to-Speech backends

mod http_backend;

pub use http_backend::{RemoteSynthesizer, RemoteTtsConfig};

use std::time::Duration;

use voice_dialogue_config::TtsConfig;

impl From<&TtsConfig> for RemoteTtsConfig {
    fn from(config: &TtsConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            min_speed: config.min_speed,
            max_speed: config.max_speed,
            max_text_length: config.max_text_length,
            max_concurrent: config.max_concurrent,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}
