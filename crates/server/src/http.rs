//! HTTP Endpoints
//!
//! REST surface for the dialogue engine.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_dialogue_core::HealthStatus;
use voice_dialogue_pipeline::ProcessingMetadata;

use crate::metrics::{metrics_handler, record_request, record_stage_timings};
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.get_config();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let body_limit = config.server.max_upload_bytes;
    drop(config);

    Router::new()
        .route("/api/orchestrator/dialogue", post(dialogue))
        .route("/api/orchestrator/status", get(orchestrator_status))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/ws/realtime", get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - disabled: permissive (development)
/// - enabled with no valid origins: localhost:3000 only
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any);

    if parsed.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return layer.allow_origin(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!(count = parsed.len(), "CORS configured");
    layer.allow_origin(parsed)
}

/// Uploaded dialogue request
struct DialogueUpload {
    filename: String,
    audio: Vec<u8>,
    speed: Option<f32>,
}

async fn read_upload(mut multipart: Multipart) -> Result<DialogueUpload, ServerError> {
    let mut upload = DialogueUpload { filename: String::new(), audio: Vec::new(), speed: None };
    let mut saw_audio = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("audio") => {
                upload.filename = field.file_name().unwrap_or_default().to_string();
                upload.audio = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::InvalidRequest(format!("Failed to read audio: {}", e)))?
                    .to_vec();
                saw_audio = true;
            },
            Some("speed") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::InvalidRequest(format!("Failed to read speed: {}", e)))?;
                let speed = text
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| ServerError::InvalidRequest(format!("Invalid speed value: {}", text)))?;
                upload.speed = Some(speed);
            },
            _ => {},
        }
    }

    if !saw_audio {
        return Err(ServerError::InvalidRequest("Missing 'audio' file field".to_string()));
    }
    Ok(upload)
}

fn metadata_headers(metadata: &ProcessingMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"response.wav\""),
    );
    for (name, value) in metadata.headers() {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            headers.insert(name, value);
        }
    }
    headers
}

/// `POST /api/orchestrator/dialogue`
async fn dialogue(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ServerError> {
    let result = run_dialogue(&state, multipart).await;
    record_request("dialogue", if result.is_ok() { "success" } else { "error" });
    result
}

async fn run_dialogue(state: &AppState, multipart: Multipart) -> Result<Response, ServerError> {
    let upload = read_upload(multipart).await?;

    let speed = {
        let config = state.get_config();
        let speed = upload.speed.unwrap_or(config.tts.default_speed);
        if !config.tts.accepts_speed(speed) {
            return Err(ServerError::InvalidRequest(format!(
                "Speed must be between {} and {}",
                config.tts.min_speed, config.tts.max_speed
            )));
        }
        speed
    };

    tracing::info!(
        filename = %upload.filename,
        bytes = upload.audio.len(),
        speed,
        "Dialogue request received"
    );

    let outcome = state
        .orchestrator
        .run(&upload.audio, &upload.filename, speed)
        .await?;
    record_stage_timings(&outcome.metadata);

    Ok((StatusCode::OK, metadata_headers(&outcome.metadata), outcome.audio).into_response())
}

/// `GET /api/orchestrator/status`
async fn orchestrator_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.orchestrator.status();
    let code = if status.overall == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(status))
}

/// Liveness
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.sessions.session_count(),
    }))
}

/// Readiness: all three collaborators accept work
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let ready = state.orchestrator.is_ready();
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        code,
        Json(json!({
            "ready": ready,
            "available_permits": state.orchestrator.available_permits(),
            "max_concurrent": state.orchestrator.max_concurrent(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_headers() {
        let metadata = ProcessingMetadata {
            total_time: 1.5,
            stt_time: 0.5,
            llm_time: 0.5,
            tts_time: 0.25,
            input_duration: 2.0,
            input_text_length: 10,
            output_text_length: 20,
            output_duration: 3.0,
            sample_rate: 24_000,
        };
        let headers = metadata_headers(&metadata);
        assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(headers["x-processing-time-total"], "1.500");
        assert_eq!(headers["x-sample-rate"], "24000");
    }

    #[test]
    fn test_cors_layer_builds() {
        let _ = build_cors_layer(&[], false);
        let _ = build_cors_layer(&["not a header\n".to_string()], true);
        let _ = build_cors_layer(&["https://app.example.com".to_string()], true);
    }
}
