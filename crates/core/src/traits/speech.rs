//! Speech processing traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{audio, Result, ServiceHealth};

/// Recognizer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Recognized text, untrimmed
    pub text: String,
    /// Measured duration of the input audio
    pub duration_seconds: f64,
    /// Detected language, when the backend reports one
    #[serde(default)]
    pub language: Option<String>,
}

/// Synthesizer output: mono samples normalized to [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl SynthesizedAudio {
    pub fn duration_seconds(&self) -> f64 {
        audio::duration_seconds(self.sample_rate, self.samples.len())
    }
}

/// Speech-to-Text interface
///
/// # Example
///
/// ```ignore
/// let stt: Arc<dyn SpeechRecognizer> = Arc::new(RemoteRecognizer::new(config)?);
/// let transcription = stt.transcribe(&bytes, "clip.wav").await?;
/// println!("Transcribed: {}", transcription.text);
/// ```
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Whether the recognizer can accept work
    fn ready(&self) -> bool;

    /// Transcribe an uploaded audio container
    ///
    /// # Arguments
    /// * `audio` - Raw container bytes (WAV, MP3, ...)
    /// * `filename` - Original filename, used for format detection
    ///
    /// # Returns
    /// Recognized text with the measured input duration
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<Transcription>;

    /// Self-reported health
    fn health(&self) -> ServiceHealth;

    /// Model name for logging
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Text-to-Speech interface
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Whether the synthesizer can accept work
    fn ready(&self) -> bool;

    /// Synthesize text to audio
    ///
    /// # Arguments
    /// * `text` - Text to synthesize
    /// * `speed` - Speaking rate multiplier (1.0 = normal)
    ///
    /// # Errors
    /// `Error::InvalidInput` when the text is unacceptable (empty, too long)
    async fn synthesize(&self, text: &str, speed: f32) -> Result<SynthesizedAudio>;

    /// Self-reported health
    fn health(&self) -> ServiceHealth;

    /// Encode samples into a self-contained WAV file
    fn encode_wav(&self, sample_rate: u32, samples: &[f32]) -> Result<Vec<u8>> {
        audio::encode_wav(sample_rate, samples)
    }

    /// Playback duration of the given samples
    fn duration_seconds(&self, sample_rate: u32, samples: &[f32]) -> f64 {
        audio::duration_seconds(sample_rate, samples.len())
    }
}
