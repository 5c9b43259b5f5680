//! Orchestrator error taxonomy
//!
//! Every failure of a pipeline run is expressed as exactly one `ErrorKind`.
//! Collaborator errors never cross the coordinator boundary; they are mapped
//! here, with the original detail folded into the message.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use voice_dialogue_core::{Error as CoreError, GenerationError};

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidAudioFormat,
    AudioTooShort,
    AudioTooLong,
    SpeechRecognitionFailed,
    SttServiceUnavailable,
    LlmServiceUnavailable,
    LlmRateLimited,
    LlmConnectionError,
    TtsServiceUnavailable,
    SynthesisFailed,
    TooManyRequests,
    ProcessingTimeout,
}

/// Caller guidance for an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The input must change before a retry can succeed
    Client,
    /// The same request may succeed later
    Transient,
    /// The engine failed on valid input; a retry may succeed
    Server,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAudioFormat => "INVALID_AUDIO_FORMAT",
            ErrorKind::AudioTooShort => "AUDIO_TOO_SHORT",
            ErrorKind::AudioTooLong => "AUDIO_TOO_LONG",
            ErrorKind::SpeechRecognitionFailed => "SPEECH_RECOGNITION_FAILED",
            ErrorKind::SttServiceUnavailable => "STT_SERVICE_UNAVAILABLE",
            ErrorKind::LlmServiceUnavailable => "LLM_SERVICE_UNAVAILABLE",
            ErrorKind::LlmRateLimited => "LLM_RATE_LIMITED",
            ErrorKind::LlmConnectionError => "LLM_CONNECTION_ERROR",
            ErrorKind::TtsServiceUnavailable => "TTS_SERVICE_UNAVAILABLE",
            ErrorKind::SynthesisFailed => "SYNTHESIS_FAILED",
            ErrorKind::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorKind::ProcessingTimeout => "PROCESSING_TIMEOUT",
        }
    }

    /// HTTP status used by the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidAudioFormat | ErrorKind::AudioTooShort | ErrorKind::AudioTooLong => 400,
            ErrorKind::SpeechRecognitionFailed => 422,
            ErrorKind::LlmRateLimited | ErrorKind::TooManyRequests => 429,
            ErrorKind::SynthesisFailed => 500,
            ErrorKind::SttServiceUnavailable
            | ErrorKind::LlmServiceUnavailable
            | ErrorKind::LlmConnectionError
            | ErrorKind::TtsServiceUnavailable => 503,
            ErrorKind::ProcessingTimeout => 504,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::InvalidAudioFormat
            | ErrorKind::AudioTooShort
            | ErrorKind::AudioTooLong
            | ErrorKind::SpeechRecognitionFailed => Severity::Client,
            ErrorKind::SynthesisFailed => Severity::Server,
            _ => Severity::Transient,
        }
    }

    /// Whether resubmitting the same input can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self.severity(), Severity::Client)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failed pipeline run
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{kind}: {message}")]
pub struct OrchestratorError {
    #[serde(rename = "code")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl OrchestratorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// Attach a structured detail
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Attach a retry hint in seconds
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Response body: `{"error": {"code", "message", "details"?, "retry_after"?}}`
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "error": self })
    }

    pub fn invalid_audio_format(supported: &str) -> Self {
        Self::new(
            ErrorKind::InvalidAudioFormat,
            format!("Unsupported audio format. Supported: {}", supported),
        )
    }

    pub fn audio_too_short(duration: f64, min_duration: f64) -> Self {
        Self::new(
            ErrorKind::AudioTooShort,
            format!("Audio duration is too short (minimum {} seconds)", min_duration),
        )
        .with_detail("duration", duration)
        .with_detail("min_duration", min_duration)
    }

    pub fn audio_too_long(duration: f64, max_duration: f64) -> Self {
        Self::new(
            ErrorKind::AudioTooLong,
            format!("Audio duration exceeds {:.0} minute limit", max_duration / 60.0),
        )
        .with_detail("duration", duration)
        .with_detail("max_duration", max_duration)
    }

    pub fn speech_not_recognized() -> Self {
        Self::new(ErrorKind::SpeechRecognitionFailed, "Could not recognize speech in the audio")
    }

    pub fn too_many_requests(retry_after: u64) -> Self {
        Self::new(ErrorKind::TooManyRequests, "Too many concurrent requests").with_retry_after(retry_after)
    }

    pub fn processing_timeout(limit_secs: u64) -> Self {
        Self::new(
            ErrorKind::ProcessingTimeout,
            format!("Processing exceeded {} second limit", limit_secs),
        )
        .with_detail("timeout", limit_secs)
    }

    /// A recognizer fault
    pub fn from_recognizer(err: CoreError) -> Self {
        Self::new(ErrorKind::SttServiceUnavailable, format!("Speech recognition failed: {}", err))
    }

    /// A synthesizer fault; content rejections and opaque faults alike
    pub fn from_synthesizer(err: CoreError) -> Self {
        let detail = match err {
            CoreError::InvalidInput(msg) | CoreError::Tts(msg) => msg,
            other => other.to_string(),
        };
        Self::new(ErrorKind::SynthesisFailed, format!("Speech synthesis failed: {}", detail))
    }

    /// A generator fault, classified by category
    pub fn from_generator(err: GenerationError, rate_limit_retry_after: u64) -> Self {
        match err {
            GenerationError::RateLimited(_) => Self::new(ErrorKind::LlmRateLimited, "LLM API rate limit exceeded")
                .with_retry_after(rate_limit_retry_after),
            GenerationError::Connection(_) => Self::new(ErrorKind::LlmConnectionError, "LLM API connection failed"),
            other => Self::new(ErrorKind::LlmServiceUnavailable, format!("LLM processing failed: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (ErrorKind::InvalidAudioFormat, 400),
            (ErrorKind::AudioTooShort, 400),
            (ErrorKind::AudioTooLong, 400),
            (ErrorKind::SpeechRecognitionFailed, 422),
            (ErrorKind::SttServiceUnavailable, 503),
            (ErrorKind::LlmServiceUnavailable, 503),
            (ErrorKind::LlmConnectionError, 503),
            (ErrorKind::TtsServiceUnavailable, 503),
            (ErrorKind::LlmRateLimited, 429),
            (ErrorKind::TooManyRequests, 429),
            (ErrorKind::SynthesisFailed, 500),
            (ErrorKind::ProcessingTimeout, 504),
        ];
        for (kind, status) in cases {
            assert_eq!(kind.status_code(), status, "{}", kind);
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, kind.code());
        }
    }

    #[test]
    fn test_retryability() {
        assert!(!ErrorKind::InvalidAudioFormat.is_retryable());
        assert!(!ErrorKind::AudioTooLong.is_retryable());
        assert!(!ErrorKind::SpeechRecognitionFailed.is_retryable());
        assert!(ErrorKind::TooManyRequests.is_retryable());
        assert!(ErrorKind::LlmConnectionError.is_retryable());
        assert!(ErrorKind::SynthesisFailed.is_retryable());
    }

    #[test]
    fn test_audio_too_short_details() {
        let err = OrchestratorError::audio_too_short(0.2, 0.5);
        assert_eq!(err.kind, ErrorKind::AudioTooShort);
        let details = err.details.as_ref().unwrap();
        assert_eq!(details["duration"], 0.2);
        assert_eq!(details["min_duration"], 0.5);
    }

    #[test]
    fn test_audio_too_long_message() {
        let err = OrchestratorError::audio_too_long(400.0, 300.0);
        assert_eq!(err.message, "Audio duration exceeds 5 minute limit");
    }

    #[test]
    fn test_generator_mapping() {
        let err = OrchestratorError::from_generator(GenerationError::RateLimited("429".into()), 60);
        assert_eq!(err.kind, ErrorKind::LlmRateLimited);
        assert_eq!(err.retry_after, Some(60));

        let err = OrchestratorError::from_generator(GenerationError::Connection("reset".into()), 60);
        assert_eq!(err.kind, ErrorKind::LlmConnectionError);
        assert_eq!(err.retry_after, None);

        let err = OrchestratorError::from_generator(GenerationError::Api("HTTP 400".into()), 60);
        assert_eq!(err.kind, ErrorKind::LlmServiceUnavailable);
        assert!(err.message.starts_with("LLM processing failed"));
    }

    #[test]
    fn test_json_body() {
        let body = OrchestratorError::too_many_requests(5).to_json();
        assert_eq!(body["error"]["code"], "TOO_MANY_REQUESTS");
        assert_eq!(body["error"]["retry_after"], 5);
        assert!(body["error"].get("details").is_none());
    }
}
