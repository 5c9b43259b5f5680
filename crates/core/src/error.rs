//! Error types shared by collaborator implementations

use thiserror::Error;

/// Result alias used by the speech collaborators
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::Audio(err.to_string())
    }
}
