//! HTTP TTS Backend - OpenAI-compatible speech endpoint
//!
//! Requests raw PCM (24 kHz, 16-bit, mono, little-endian) from
//! `{endpoint}/audio/speech` and hands normalized samples back to the
//! coordinator, which owns WAV encoding.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};

use voice_dialogue_config::constants::{endpoints, tts};
use voice_dialogue_core::{
    pcm16_to_f32, Error, Result, ServiceHealth, SpeechSynthesizer, SynthesizedAudio,
};

use crate::admission::AdmissionController;
use crate::is_local_endpoint;

/// HTTP TTS backend configuration
#[derive(Debug, Clone)]
pub struct RemoteTtsConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Longest accepted input, in characters
    pub max_text_length: usize,
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl Default for RemoteTtsConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OPENAI_DEFAULT.to_string(),
            api_key: String::new(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            min_speed: tts::MIN_SPEED,
            max_speed: tts::MAX_SPEED,
            max_text_length: tts::MAX_TEXT_LENGTH,
            max_concurrent: tts::MAX_CONCURRENT,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

/// Remote synthesizer
pub struct RemoteSynthesizer {
    config: RemoteTtsConfig,
    client: Client,
    permits: AdmissionController,
    last_error: Mutex<Option<String>>,
}

impl RemoteSynthesizer {
    pub fn new(config: RemoteTtsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            voice = %config.voice,
            "HTTP TTS backend configured"
        );

        Ok(Self {
            permits: AdmissionController::new("tts", config.max_concurrent),
            config,
            client,
            last_error: Mutex::new(None),
        })
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.config.endpoint.trim_end_matches('/'))
    }

    fn validate<'a>(&self, text: &'a str) -> Result<&'a str> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Text must not be empty".to_string()));
        }
        let length = trimmed.chars().count();
        if length > self.config.max_text_length {
            return Err(Error::InvalidInput(format!(
                "Text too long ({} > {} characters)",
                length, self.config.max_text_length
            )));
        }
        Ok(trimmed)
    }

    async fn request(&self, text: &str, speed: f32) -> Result<Vec<u8>> {
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            speed: speed.clamp(self.config.min_speed, self.config.max_speed),
            response_format: "pcm",
        };

        let mut builder = self.client.post(self.speech_url()).json(&body);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Tts(format!("HTTP TTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("HTTP TTS service returned {}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(format!("Failed to read TTS audio: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteSynthesizer {
    fn ready(&self) -> bool {
        !self.config.endpoint.is_empty()
            && (!self.config.api_key.is_empty() || is_local_endpoint(&self.config.endpoint))
    }

    async fn synthesize(&self, text: &str, speed: f32) -> Result<SynthesizedAudio> {
        if !self.ready() {
            return Err(Error::NotReady("TTS backend is not configured".to_string()));
        }
        let text = self.validate(text)?;

        let _permit = self
            .permits
            .acquire_wait()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        let start = Instant::now();
        let pcm = match self.request(text, speed).await {
            Ok(pcm) => {
                *self.last_error.lock() = None;
                pcm
            },
            Err(e) => {
                tracing::warn!(error = %e, "TTS request failed");
                *self.last_error.lock() = Some(e.to_string());
                return Err(e);
            },
        };

        if pcm.len() < 2 {
            return Err(Error::Tts("TTS service returned no audio".to_string()));
        }

        let samples = pcm16_to_f32(&pcm);
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            samples = samples.len(),
            "Synthesis finished"
        );

        Ok(SynthesizedAudio {
            sample_rate: tts::PCM_SAMPLE_RATE,
            samples,
        })
    }

    fn health(&self) -> ServiceHealth {
        let base = if !self.ready() {
            ServiceHealth::unhealthy().with_detail("reason", "endpoint or API key not configured")
        } else if let Some(err) = self.last_error.lock().clone() {
            ServiceHealth::degraded().with_detail("last_error", err)
        } else {
            ServiceHealth::healthy()
        };

        base.with_detail("model", self.config.model.clone())
            .with_detail("voice", self.config.voice.clone())
            .with_detail("sample_rate", tts::PCM_SAMPLE_RATE)
            .with_detail("available_permits", self.permits.available())
            .with_detail("max_concurrent", self.permits.capacity())
    }
}
