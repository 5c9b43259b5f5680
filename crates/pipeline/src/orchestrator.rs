//! Dialogue Pipeline Orchestrator
//!
//! Coordinates one request-response dialogue turn:
//!
//! 1. Preconditions: upload format, collaborator readiness, admission permit
//! 2. STT: transcribe, trim, validate measured duration
//! 3. LLM: generate a reply in a fresh single-turn conversation
//! 4. TTS: synthesize the reply and wrap it in a WAV container
//!
//! Stages run strictly in sequence within a run; concurrency across runs is
//! bounded by the admission pool. Nothing is retried here. Every failure is
//! returned as an `OrchestratorError` for the caller to act on.

use std::sync::Arc;
use std::time::Instant;

use voice_dialogue_config::constants::llm::RATE_LIMIT_RETRY_AFTER_SECS;
use voice_dialogue_config::OrchestratorConfig;
use voice_dialogue_core::{
    supported_formats_label, AudioFormat, SpeechRecognizer, SpeechSynthesizer, TextGenerator,
};

use crate::admission::{AdmissionController, AdmissionPermit};
use crate::error::{ErrorKind, OrchestratorError};
use crate::metadata::ProcessingMetadata;
use crate::status::{ServiceStatus, SubsystemStatuses};

/// Pipeline stage, reported to observers as it begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueStage {
    Transcribing,
    Generating,
    Synthesizing,
}

/// Receives stage transitions of a run
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: DialogueStage);
}

/// Observer that ignores everything
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage(&self, _stage: DialogueStage) {}
}

/// Successful run
#[derive(Debug, Clone)]
pub struct DialogueOutcome {
    /// WAV container with the spoken reply
    pub audio: Vec<u8>,
    pub metadata: ProcessingMetadata,
    /// Trimmed recognized text
    pub transcript: String,
    pub reply: String,
    /// Conversation id used for the generation stage
    pub conversation_id: String,
}

/// Pipeline coordinator
pub struct Orchestrator {
    recognizer: Arc<dyn SpeechRecognizer>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    admission: AdmissionController,
    formats: Vec<AudioFormat>,
    config: OrchestratorConfig,
    rate_limit_retry_after: u64,
}

impl Orchestrator {
    /// Create an orchestrator over the three collaborators
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: OrchestratorConfig,
    ) -> Self {
        let mut formats = Vec::with_capacity(config.supported_formats.len());
        for ext in &config.supported_formats {
            match AudioFormat::from_extension(ext) {
                Some(format) => formats.push(format),
                None => tracing::warn!(extension = %ext, "Ignoring unknown audio format in configuration"),
            }
        }

        tracing::info!(
            max_concurrent = config.max_concurrent,
            grace_ms = config.admission_grace_ms,
            stt = recognizer.model_name(),
            llm = generator.model_name(),
            "Orchestrator initialized"
        );

        Self {
            recognizer,
            generator,
            synthesizer,
            admission: AdmissionController::new("orchestrator", config.max_concurrent),
            formats,
            config,
            rate_limit_retry_after: RATE_LIMIT_RETRY_AFTER_SECS,
        }
    }

    /// Override the retry hint attached to LLM rate-limit errors
    pub fn with_rate_limit_retry_after(mut self, seconds: u64) -> Self {
        self.rate_limit_retry_after = seconds;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Free permits in the orchestrator-wide pool
    pub fn available_permits(&self) -> usize {
        self.admission.available()
    }

    pub fn max_concurrent(&self) -> usize {
        self.admission.capacity()
    }

    /// All three collaborators report ready
    pub fn is_ready(&self) -> bool {
        self.check_ready().is_ok()
    }

    /// Run one dialogue turn
    pub async fn run(
        &self,
        audio: &[u8],
        filename: &str,
        speed: f32,
    ) -> Result<DialogueOutcome, OrchestratorError> {
        self.run_with_observer(audio, filename, speed, &NoopObserver).await
    }

    /// Run one dialogue turn, reporting each stage as it begins
    pub async fn run_with_observer(
        &self,
        audio: &[u8],
        filename: &str,
        speed: f32,
        observer: &dyn StageObserver,
    ) -> Result<DialogueOutcome, OrchestratorError> {
        let started = Instant::now();

        self.check_format(audio, filename)?;
        self.check_ready()?;
        let _permit = self.admit().await?;

        let stages = self.run_stages(audio, filename, speed, observer, started);
        let result = match self.config.run_timeout() {
            Some(limit) => match tokio::time::timeout(limit, stages).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(limit_secs = limit.as_secs(), "Pipeline run exceeded deadline");
                    Err(OrchestratorError::processing_timeout(limit.as_secs()))
                },
            },
            None => stages.await,
        };

        if let Err(ref e) = result {
            tracing::warn!(code = %e.kind, message = %e.message, "Pipeline run failed");
        }
        result
    }

    /// Text-only turn: generation under the same admission and error mapping
    pub async fn reply_text(&self, text: &str, conversation_id: &str) -> Result<String, OrchestratorError> {
        if !self.generator.configured() {
            return Err(OrchestratorError::new(
                ErrorKind::LlmServiceUnavailable,
                "LLM service is not configured",
            ));
        }
        let _permit = self.admit().await?;

        self.generator
            .generate(text, conversation_id)
            .await
            .map_err(|e| OrchestratorError::from_generator(e, self.rate_limit_retry_after))
    }

    /// Aggregate collaborator health
    pub fn status(&self) -> ServiceStatus {
        let services = SubsystemStatuses {
            stt: self.recognizer.health(),
            llm: self.generator.health(),
            tts: self.synthesizer.health(),
        };
        ServiceStatus::new(services, self.admission.available(), self.admission.capacity())
    }

    fn check_format(&self, audio: &[u8], filename: &str) -> Result<(), OrchestratorError> {
        let allowed = AudioFormat::from_filename(filename)
            .map(|format| self.formats.contains(&format))
            .unwrap_or(false);

        if audio.is_empty() || !allowed {
            return Err(OrchestratorError::invalid_audio_format(&supported_formats_label(&self.formats)));
        }
        Ok(())
    }

    fn check_ready(&self) -> Result<(), OrchestratorError> {
        if !self.recognizer.ready() {
            return Err(OrchestratorError::new(
                ErrorKind::SttServiceUnavailable,
                "STT service is not available",
            ));
        }
        if !self.generator.configured() {
            return Err(OrchestratorError::new(
                ErrorKind::LlmServiceUnavailable,
                "LLM service is not configured",
            ));
        }
        if !self.synthesizer.ready() {
            return Err(OrchestratorError::new(
                ErrorKind::TtsServiceUnavailable,
                "TTS model is not loaded",
            ));
        }
        Ok(())
    }

    async fn admit(&self) -> Result<AdmissionPermit, OrchestratorError> {
        self.admission
            .acquire(self.config.admission_grace())
            .await
            .map_err(|_| OrchestratorError::too_many_requests(self.config.retry_after_secs))
    }

    async fn run_stages(
        &self,
        audio: &[u8],
        filename: &str,
        speed: f32,
        observer: &dyn StageObserver,
        started: Instant,
    ) -> Result<DialogueOutcome, OrchestratorError> {
        // STT
        observer.on_stage(DialogueStage::Transcribing);
        let stt_start = Instant::now();
        let transcription = self.recognizer.transcribe(audio, filename).await.map_err(|e| {
            tracing::error!(error = %e, filename = %filename, "STT processing failed");
            OrchestratorError::from_recognizer(e)
        })?;
        let stt_time = stt_start.elapsed().as_secs_f64();

        let transcript = transcription.text.trim().to_string();
        if transcript.is_empty() {
            return Err(OrchestratorError::speech_not_recognized());
        }
        self.check_duration(transcription.duration_seconds)?;

        tracing::debug!(
            text_length = transcript.chars().count(),
            duration = transcription.duration_seconds,
            stt_time,
            "STT completed"
        );

        // LLM
        observer.on_stage(DialogueStage::Generating);
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let llm_start = Instant::now();
        let reply = self
            .generator
            .generate(&transcript, &conversation_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, conversation_id = %conversation_id, "LLM processing failed");
                OrchestratorError::from_generator(e, self.rate_limit_retry_after)
            })?;
        let llm_time = llm_start.elapsed().as_secs_f64();

        tracing::debug!(reply_length = reply.chars().count(), llm_time, "LLM completed");

        // TTS
        observer.on_stage(DialogueStage::Synthesizing);
        let tts_start = Instant::now();
        let synthesized = self.synthesizer.synthesize(&reply, speed).await.map_err(|e| {
            tracing::error!(error = %e, "TTS synthesis failed");
            OrchestratorError::from_synthesizer(e)
        })?;
        let output_duration = self
            .synthesizer
            .duration_seconds(synthesized.sample_rate, &synthesized.samples);
        let wav = self
            .synthesizer
            .encode_wav(synthesized.sample_rate, &synthesized.samples)
            .map_err(OrchestratorError::from_synthesizer)?;
        let tts_time = tts_start.elapsed().as_secs_f64();

        let metadata = ProcessingMetadata {
            total_time: started.elapsed().as_secs_f64(),
            stt_time,
            llm_time,
            tts_time,
            input_duration: transcription.duration_seconds,
            input_text_length: transcript.chars().count(),
            output_text_length: reply.chars().count(),
            output_duration,
            sample_rate: synthesized.sample_rate,
        };

        tracing::info!(
            total_time = metadata.total_time,
            stt_time,
            llm_time,
            tts_time,
            output_duration,
            "Dialogue processing completed"
        );

        Ok(DialogueOutcome {
            audio: wav,
            metadata,
            transcript,
            reply,
            conversation_id,
        })
    }

    fn check_duration(&self, duration: f64) -> Result<(), OrchestratorError> {
        if duration < self.config.min_audio_duration {
            return Err(OrchestratorError::audio_too_short(duration, self.config.min_audio_duration));
        }
        if duration > self.config.max_audio_duration {
            return Err(OrchestratorError::audio_too_long(duration, self.config.max_audio_duration));
        }
        Ok(())
    }
}
