//! HTTP STT Backend - OpenAI-compatible transcription endpoint
//!
//! Posts the uploaded container as multipart form data to
//! `{endpoint}/audio/transcriptions` and asks for `verbose_json` so the
//! response carries the measured duration. Works with hosted Whisper and
//! with self-hosted servers exposing the same route.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use voice_dialogue_config::constants::{endpoints, stt};
use voice_dialogue_core::{
    wav_duration, AudioFormat, Error, Result, ServiceHealth, SpeechRecognizer, Transcription,
};

use crate::admission::AdmissionController;
use crate::is_local_endpoint;

/// HTTP STT backend configuration
#[derive(Debug, Clone)]
pub struct RemoteSttConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Language hint; `None` lets the backend detect it
    pub language: Option<String>,
    /// Concurrent upstream requests
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl Default for RemoteSttConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OPENAI_DEFAULT.to_string(),
            api_key: String::new(),
            model: "whisper-1".to_string(),
            language: None,
            max_concurrent: stt::MAX_CONCURRENT,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Response from the transcription service
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

/// Remote recognizer
pub struct RemoteRecognizer {
    config: RemoteSttConfig,
    client: Client,
    permits: AdmissionController,
    last_error: Mutex<Option<String>>,
}

impl RemoteRecognizer {
    /// Create a new HTTP STT backend
    pub fn new(config: RemoteSttConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            max_concurrent = config.max_concurrent,
            "HTTP STT backend configured"
        );

        Ok(Self {
            permits: AdmissionController::new("stt", config.max_concurrent),
            config,
            client,
            last_error: Mutex::new(None),
        })
    }

    fn transcriptions_url(&self) -> String {
        format!("{}/audio/transcriptions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_form(&self, audio: &[u8], filename: &str) -> Result<Form> {
        let mime = AudioFormat::from_filename(filename)
            .map(|f| f.mime_type())
            .unwrap_or("application/octet-stream");

        let file = Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| Error::Stt(format!("Invalid upload MIME type: {}", e)))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }
        Ok(form)
    }

    async fn request(&self, audio: &[u8], filename: &str) -> Result<TranscriptionResponse> {
        let mut builder = self
            .client
            .post(self.transcriptions_url())
            .multipart(self.build_form(audio, filename)?);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Stt(format!("HTTP STT request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("HTTP STT service returned {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("Failed to parse STT response: {}", e)))
    }
}

#[async_trait]
impl SpeechRecognizer for RemoteRecognizer {
    fn ready(&self) -> bool {
        !self.config.endpoint.is_empty()
            && (!self.config.api_key.is_empty() || is_local_endpoint(&self.config.endpoint))
    }

    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<Transcription> {
        if !self.ready() {
            return Err(Error::NotReady("STT backend is not configured".to_string()));
        }

        let _permit = self
            .permits
            .acquire_wait()
            .await
            .map_err(|e| Error::Stt(e.to_string()))?;

        let start = Instant::now();
        let response = match self.request(audio, filename).await {
            Ok(response) => {
                *self.last_error.lock() = None;
                response
            },
            Err(e) => {
                tracing::warn!(error = %e, filename = %filename, "STT request failed");
                *self.last_error.lock() = Some(e.to_string());
                return Err(e);
            },
        };

        // Some self-hosted servers omit the duration; WAV headers carry it
        let duration_seconds = match response.duration {
            Some(duration) => duration,
            None => wav_duration(audio).unwrap_or_else(|| {
                tracing::warn!(filename = %filename, "STT response has no duration");
                0.0
            }),
        };

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            duration_seconds,
            language = ?response.language,
            "Transcription finished"
        );

        Ok(Transcription {
            text: response.text,
            duration_seconds,
            language: response.language,
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
            .with_detail("available_permits", self.permits.available())
            .with_detail("max_concurrent", self.permits.capacity())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
