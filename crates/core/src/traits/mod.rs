//! Collaborator traits consumed by the dialogue engine
//!
//! The coordinator is constructed with one implementation of each trait,
//! which keeps production backends and test doubles interchangeable.
//!
//! # Trait Hierarchy
//!
//! ```text
//! Speech Processing:
//!   - SpeechRecognizer: Audio container → text + measured duration
//!   - SpeechSynthesizer: Text → PCM samples (+ WAV encoding)
//!
//! Language Models:
//!   - TextGenerator: User text + conversation id → reply text
//! ```

mod generation;
mod speech;

pub use generation::{GenerationError, TextGenerator};
pub use speech::{SpeechRecognizer, SpeechSynthesizer, SynthesizedAudio, Transcription};
