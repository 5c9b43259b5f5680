//! Voice dialogue pipeline
//!
//! Turns an uploaded utterance into a spoken reply:
//!
//! ```text
//! audio → [admission] → STT → LLM (+ conversation cache) → TTS → WAV + metadata
//! ```
//!
//! - `admission`: fixed-size permit pools with fail-fast acquisition
//! - `orchestrator`: the coordinator that sequences the three stages
//! - `error`: the closed error taxonomy every stage failure is mapped into
//! - `stt` / `tts`: OpenAI-compatible remote speech backends

pub mod admission;
pub mod error;
pub mod metadata;
pub mod orchestrator;
pub mod status;
pub mod stt;
pub mod tts;

pub use admission::{AdmissionController, AdmissionError, AdmissionPermit};
pub use error::{ErrorKind, OrchestratorError, Severity};
pub use metadata::ProcessingMetadata;
pub use orchestrator::{
    DialogueOutcome, DialogueStage, NoopObserver, Orchestrator, StageObserver,
};
pub use status::{ServiceStatus, SubsystemStatuses};
pub use stt::{RemoteRecognizer, RemoteSttConfig};
pub use tts::{RemoteSynthesizer, RemoteTtsConfig};

/// Local endpoints (self-hosted servers) need no API key
pub(crate) fn is_local_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("http://localhost") || endpoint.starts_with("http://127.0.0.1")
}
