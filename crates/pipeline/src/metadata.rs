//! Per-run timing and size telemetry

use serde::{Deserialize, Serialize};

/// Timing breakdown of one pipeline run
///
/// Times and durations are in seconds. `total_time` covers the whole run, so it
/// is never less than the sum of the stage times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub total_time: f64,
    pub stt_time: f64,
    pub llm_time: f64,
    pub tts_time: f64,
    pub input_duration: f64,
    pub input_text_length: usize,
    pub output_text_length: usize,
    pub output_duration: f64,
    pub sample_rate: u32,
}

impl ProcessingMetadata {
    pub fn stage_total(&self) -> f64 {
        self.stt_time + self.llm_time + self.tts_time
    }

    /// Response headers carrying the breakdown
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-Processing-Time-Total", format!("{:.3}", self.total_time)),
            ("X-Processing-Time-STT", format!("{:.3}", self.stt_time)),
            ("X-Processing-Time-LLM", format!("{:.3}", self.llm_time)),
            ("X-Processing-Time-TTS", format!("{:.3}", self.tts_time)),
            ("X-Input-Duration", format!("{:.3}", self.input_duration)),
            ("X-Input-Text-Length", self.input_text_length.to_string()),
            ("X-Output-Text-Length", self.output_text_length.to_string()),
            ("X-Output-Duration", format!("{:.3}", self.output_duration)),
            ("X-Sample-Rate", self.sample_rate.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let metadata = ProcessingMetadata {
            total_time: 1.23456,
            stt_time: 0.4,
            llm_time: 0.5,
            tts_time: 0.3,
            input_duration: 2.0,
            input_text_length: 12,
            output_text_length: 40,
            output_duration: 3.5,
            sample_rate: 24000,
        };

        let headers = metadata.headers();
        assert_eq!(headers.len(), 9);
        assert!(headers.contains(&("X-Processing-Time-Total", "1.235".to_string())));
        assert!(headers.contains(&("X-Sample-Rate", "24000".to_string())));
        assert!(headers.contains(&("X-Input-Text-Length", "12".to_string())));
        assert!((metadata.stage_total() - 1.2).abs() < 1e-9);
    }
}
