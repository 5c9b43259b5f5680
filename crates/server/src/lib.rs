//! Voice Dialogue Server
//!
//! Provides the HTTP dialogue endpoint, the realtime WebSocket endpoint,
//! health/status probes and Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::{
    init_metrics, record_error, record_llm_latency, record_request, record_stage_timings,
    record_stt_latency, record_total_latency, record_tts_latency, set_active_sessions,
};
pub use state::AppState;
pub use websocket::{serve_session, ws_error_code, WsTransport};

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use voice_dialogue_pipeline::OrchestratorError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ServerError {
    fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "INVALID_REQUEST",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Orchestrator(e) => e.kind.code(),
        }
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Orchestrator(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        record_error(self.code());

        match self {
            ServerError::Orchestrator(err) => {
                let mut response = (status, Json(err.to_json())).into_response();
                if let Some(seconds) = err.retry_after {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
                }
                response
            },
            other => {
                let body = serde_json::json!({
                    "error": { "code": other.code(), "message": other.to_string() }
                });
                (status, Json(body)).into_response()
            },
        }
    }
}
