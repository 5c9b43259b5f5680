//! Audio container helpers
//!
//! The engine never decodes compressed audio itself; the recognizer owns that.
//! What lives here is the small amount of audio handling the coordinator needs:
//! the upload format allow-list, WAV encoding of synthesized PCM, and duration
//! arithmetic.

use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::{Error, Result};

/// Full-scale magnitude of a 16-bit sample
const PCM16_SCALE: f32 = 32768.0;

/// Upload container formats accepted by the dialogue endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Flac,
    M4a,
    Mp3,
    Ogg,
    Wav,
    Webm,
}

impl AudioFormat {
    /// Every format the recognizer can decode
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Flac,
        AudioFormat::M4a,
        AudioFormat::Mp3,
        AudioFormat::Ogg,
        AudioFormat::Wav,
        AudioFormat::Webm,
    ];

    /// Parse an extension without the leading dot, case-insensitive
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "flac" => Some(AudioFormat::Flac),
            "m4a" => Some(AudioFormat::M4a),
            "mp3" => Some(AudioFormat::Mp3),
            "ogg" => Some(AudioFormat::Ogg),
            "wav" => Some(AudioFormat::Wav),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Detect the format from a filename's last extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
        }
    }

    /// MIME type used when forwarding the upload
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "audio/flac",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// Human readable list, e.g. "FLAC, M4A, MP3, OGG, WAV, WEBM"
pub fn supported_formats_label(formats: &[AudioFormat]) -> String {
    let mut sorted = formats.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
        .iter()
        .map(|f| f.extension().to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a filename against the allow-list
pub fn is_supported_format(filename: &str, allowed: &[AudioFormat]) -> bool {
    AudioFormat::from_filename(filename)
        .map(|format| allowed.contains(&format))
        .unwrap_or(false)
}

/// Encode mono f32 samples in [-1.0, 1.0] as a 16-bit PCM WAV container
pub fn encode_wav(sample_rate: u32, samples: &[f32]) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(Error::Audio("sample rate must be positive".to_string()));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec)?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            // `as` saturates, so +1.0 lands on i16::MAX
            writer.write_sample((clamped * PCM16_SCALE) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(buffer)
}

/// Decode little-endian 16-bit PCM into normalized f32 samples
///
/// A trailing odd byte is ignored. Samples land in [-1.0, 1.0) and survive
/// `encode_wav` unchanged.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect()
}

/// Wrap raw little-endian PCM16 mono in a WAV container
pub fn pcm16_to_wav(sample_rate: u32, pcm: &[u8]) -> Result<Vec<u8>> {
    encode_wav(sample_rate, &pcm16_to_f32(pcm))
}

/// Playback duration of `sample_count` mono samples
pub fn duration_seconds(sample_rate: u32, sample_count: usize) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

/// Duration of a WAV container read from its header, if it parses
pub fn wav_duration(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    Some(duration_seconds(spec.sample_rate, reader.duration() as usize))
}
