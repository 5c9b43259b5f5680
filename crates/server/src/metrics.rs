//! Prometheus metrics
//!
//! The `metrics` facade is used everywhere; the Prometheus recorder is
//! installed once at startup and rendered by `GET /metrics`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use crate::ServerError;

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Internal(format!("Failed to install metrics recorder: {}", e)))
}

pub fn record_stt_latency(seconds: f64) {
    metrics::histogram!("dialogue_stt_latency_seconds").record(seconds);
}

pub fn record_llm_latency(seconds: f64) {
    metrics::histogram!("dialogue_llm_latency_seconds").record(seconds);
}

pub fn record_tts_latency(seconds: f64) {
    metrics::histogram!("dialogue_tts_latency_seconds").record(seconds);
}

pub fn record_total_latency(seconds: f64) {
    metrics::histogram!("dialogue_total_latency_seconds").record(seconds);
}

/// Count a request by endpoint and outcome (`success` / `error`)
pub fn record_request(endpoint: &'static str, outcome: &'static str) {
    metrics::counter!("dialogue_requests_total", "endpoint" => endpoint, "outcome" => outcome).increment(1);
}

/// Count an error by its machine code
pub fn record_error(code: &'static str) {
    metrics::counter!("dialogue_errors_total", "code" => code).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("dialogue_ws_sessions_active").set(count as f64);
}

/// Record all stage timings of a completed run
pub fn record_stage_timings(metadata: &voice_dialogue_pipeline::ProcessingMetadata) {
    record_stt_latency(metadata.stt_time);
    record_llm_latency(metadata.llm_time);
    record_tts_latency(metadata.tts_time);
    record_total_latency(metadata.total_time);
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    set_active_sessions(state.sessions.session_count());

    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
