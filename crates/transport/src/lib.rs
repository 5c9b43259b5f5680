//! Realtime transport for voice dialogue
//!
//! - `protocol`: the JSON message set exchanged over the socket
//! - `session`: the session registry, heartbeat and delivery path

pub mod protocol;
pub mod session;

pub use protocol::{
    parse_client_message, ClientMessage, ProcessingStatus, ProtocolError, ProtocolLimits,
    ServerMessage, StreamFormat, WsErrorCode,
};
pub use session::{StreamSession, StreamSessionManager, Transport};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Send failed: {0}")]
    Send(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}
