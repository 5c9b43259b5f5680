//! Realtime protocol messages
//!
//! JSON frames tagged by `type`. Timestamps are RFC 3339 UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Pipeline stage reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Idle,
    Recording,
    Transcribing,
    Generating,
    Synthesizing,
    Playing,
    Error,
}

/// Error codes carried by `error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsErrorCode {
    // Connection
    ConnectionFailed,
    ConnectionTimeout,
    ConnectionClosed,
    // STT
    SttServiceError,
    SttTimeout,
    AudioTooShort,
    AudioTooLong,
    InvalidAudioFormat,
    // LLM
    LlmServiceError,
    LlmTimeout,
    LlmRateLimited,
    // TTS
    TtsServiceError,
    TtsTimeout,
    // General
    InvalidMessage,
    InternalError,
}

/// Encoding of streamed audio chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    #[default]
    Pcm16,
    Opus,
    Webm,
}

/// Server → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        session_id: String,
        server_time: DateTime<Utc>,
    },
    StatusUpdate {
        status: ProcessingStatus,
        timestamp: DateTime<Utc>,
    },
    TranscriptFinal {
        content: String,
        confidence: f32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ResponseComplete {
        full_text: String,
        audio_available: bool,
        timestamp: DateTime<Utc>,
    },
    /// Base64 WAV
    ResponseAudio {
        data: String,
        sample_rate: u32,
    },
    Error {
        code: WsErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Map<String, Value>>,
        recoverable: bool,
        timestamp: DateTime<Utc>,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn connection_ack(session_id: impl Into<String>) -> Self {
        ServerMessage::ConnectionAck {
            session_id: session_id.into(),
            server_time: Utc::now(),
        }
    }

    pub fn status(status: ProcessingStatus) -> Self {
        ServerMessage::StatusUpdate { status, timestamp: Utc::now() }
    }

    pub fn transcript_final(content: impl Into<String>, confidence: f32, duration_ms: u64) -> Self {
        ServerMessage::TranscriptFinal {
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn response_complete(full_text: impl Into<String>, audio_available: bool) -> Self {
        ServerMessage::ResponseComplete {
            full_text: full_text.into(),
            audio_available,
            timestamp: Utc::now(),
        }
    }

    pub fn error(
        code: WsErrorCode,
        message: impl Into<String>,
        recoverable: bool,
        details: Option<Map<String, Value>>,
    ) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
            details,
            recoverable,
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        ServerMessage::Ping { timestamp: Utc::now() }
    }

    /// Frame type tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionAck { .. } => "connection_ack",
            ServerMessage::StatusUpdate { .. } => "status_update",
            ServerMessage::TranscriptFinal { .. } => "transcript_final",
            ServerMessage::ResponseComplete { .. } => "response_complete",
            ServerMessage::ResponseAudio { .. } => "response_audio",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Ping { .. } => "ping",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn default_sample_rate() -> u32 {
    16_000
}

/// Client → server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64 audio, PCM16 unless `format` says otherwise
    AudioChunk {
        data: String,
        chunk_index: u32,
        #[serde(default = "default_sample_rate")]
        sample_rate: u32,
        #[serde(default)]
        format: StreamFormat,
    },
    AudioEnd {
        total_chunks: u32,
        total_duration_ms: u64,
    },
    TextInput {
        content: String,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
}

/// Longest accepted `text_input`, in characters
pub const MAX_TEXT_INPUT_CHARS: usize = 10_000;
/// Default longest stream announced by `audio_end`
pub const MAX_STREAM_DURATION_MS: u64 = 60_000;

/// Bounds applied when validating inbound frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLimits {
    pub max_stream_duration_ms: u64,
    pub max_text_chars: usize,
}

impl ProtocolLimits {
    /// Default limits with the stream bound taken from configuration
    pub fn with_max_stream_secs(secs: u64) -> Self {
        Self {
            max_stream_duration_ms: secs.saturating_mul(1000),
            ..Self::default()
        }
    }
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_stream_duration_ms: MAX_STREAM_DURATION_MS,
            max_text_chars: MAX_TEXT_INPUT_CHARS,
        }
    }
}

/// Inbound frame rejections; both are recoverable for the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Parse and validate one inbound text frame
pub fn parse_client_message(raw: &str, limits: &ProtocolLimits) -> Result<ClientMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;
    let message: ClientMessage =
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
    validate(&message, limits)?;
    Ok(message)
}

fn validate(message: &ClientMessage, limits: &ProtocolLimits) -> Result<(), ProtocolError> {
    match message {
        ClientMessage::AudioChunk { sample_rate, .. } if !(8_000..=48_000).contains(sample_rate) => Err(
            ProtocolError::InvalidMessage(format!("sample_rate {} outside 8000..=48000", sample_rate)),
        ),
        ClientMessage::AudioEnd { total_duration_ms, .. }
            if *total_duration_ms > limits.max_stream_duration_ms =>
        {
            Err(ProtocolError::InvalidMessage(format!(
                "total_duration_ms {} exceeds {}",
                total_duration_ms, limits.max_stream_duration_ms
            )))
        },
        ClientMessage::TextInput { content, .. } => {
            let length = content.chars().count();
            if length == 0 || length > limits.max_text_chars {
                Err(ProtocolError::InvalidMessage(format!(
                    "content length must be between 1 and {} characters",
                    limits.max_text_chars
                )))
            } else {
                Ok(())
            }
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<ClientMessage, ProtocolError> {
        parse_client_message(raw, &ProtocolLimits::default())
    }

    #[test]
    fn test_server_message_shape() {
        let json = serde_json::to_value(ServerMessage::connection_ack("abc")).unwrap();
        assert_eq!(json["type"], "connection_ack");
        assert_eq!(json["session_id"], "abc");
        assert!(json["server_time"].is_string());

        let json = serde_json::to_value(ServerMessage::status(ProcessingStatus::Transcribing)).unwrap();
        assert_eq!(json["type"], "status_update");
        assert_eq!(json["status"], "transcribing");

        let err = ServerMessage::error(WsErrorCode::LlmRateLimited, "slow down", true, None);
        let json = serde_json::to_value(err).unwrap();
        assert_eq!(json["code"], "LLM_RATE_LIMITED");
        assert_eq!(json["recoverable"], true);
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_parse_audio_chunk_defaults() {
        let msg = parse(r#"{"type":"audio_chunk","data":"AAA=","chunk_index":0}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AudioChunk {
                data: "AAA=".to_string(),
                chunk_index: 0,
                sample_rate: 16_000,
                format: StreamFormat::Pcm16,
            }
        );
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(parse("{not json"), Err(ProtocolError::InvalidJson));
        assert_eq!(ProtocolError::InvalidJson.to_string(), "Invalid JSON format");

        let err = parse(r#"{"type":"dance"}"#).unwrap_err();
        assert!(err.to_string().starts_with("Invalid message: "));

        let err = parse(r#"{"type":"audio_chunk","data":"","chunk_index":-1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));

        let err = parse(r#"{"type":"audio_chunk","data":"","chunk_index":1,"sample_rate":96000}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));

        let err = parse(r#"{"type":"audio_end","total_chunks":3,"total_duration_ms":61000}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));

        let err = parse(r#"{"type":"text_input","content":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_parse_optional_fields() {
        assert_eq!(
            parse(r#"{"type":"cancel"}"#).unwrap(),
            ClientMessage::Cancel { reason: None }
        );
        let msg = parse(r#"{"type":"text_input","content":"hi","conversation_id":"c1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::TextInput { conversation_id: Some(ref id), .. } if id == "c1"));
        assert!(parse(r#"{"type":"pong","timestamp":"2026-01-01T00:00:00Z"}"#).is_ok());
    }

    #[test]
    fn test_configured_stream_limit() {
        let end = r#"{"type":"audio_end","total_chunks":3,"total_duration_ms":45000}"#;
        assert!(parse(end).is_ok());

        let limits = ProtocolLimits::with_max_stream_secs(30);
        assert_eq!(limits.max_text_chars, MAX_TEXT_INPUT_CHARS);
        let err = parse_client_message(end, &limits).unwrap_err();
        assert_eq!(err.to_string(), "Invalid message: total_duration_ms 45000 exceeds 30000");
    }
}
