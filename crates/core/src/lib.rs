//! Core traits and types for the voice dialogue engine
//!
//! This crate provides foundational types used across all other crates:
//! - Collaborator traits for speech recognition, text generation and synthesis
//! - Conversation turn and record types
//! - Health classification and aggregation
//! - Audio helpers (WAV container encoding, duration, format allow-list)
//! - Error types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod health;
pub mod traits;

pub use audio::{
    duration_seconds, encode_wav, is_supported_format, pcm16_to_f32, pcm16_to_wav,
    supported_formats_label, wav_duration, AudioFormat,
};
pub use conversation::{ConversationRecord, DialogueTurn, TurnRole};
pub use error::{Error, Result};
pub use health::{HealthStatus, ServiceHealth};

pub use traits::{
    GenerationError, SpeechRecognizer, SpeechSynthesizer, SynthesizedAudio, TextGenerator,
    Transcription,
};
