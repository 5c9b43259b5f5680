//! HTTP surface against scripted collaborators

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use voice_dialogue_config::{OrchestratorConfig, Settings};
use voice_dialogue_core::{
    GenerationError, Result, ServiceHealth, SpeechRecognizer, SpeechSynthesizer, SynthesizedAudio,
    TextGenerator, Transcription,
};
use voice_dialogue_pipeline::Orchestrator;
use voice_dialogue_server::{create_router, AppState};

const BOUNDARY: &str = "dialogue-test-boundary";

struct ScriptedStt {
    ready: bool,
    delay: Duration,
}

#[async_trait]
impl SpeechRecognizer for ScriptedStt {
    fn ready(&self) -> bool {
        self.ready
    }

    async fn transcribe(&self, _audio: &[u8], _filename: &str) -> Result<Transcription> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Transcription {
            text: "book a table for two".to_string(),
            duration_seconds: 1.5,
            language: None,
        })
    }

    fn health(&self) -> ServiceHealth {
        if self.ready {
            ServiceHealth::healthy()
        } else {
            ServiceHealth::unhealthy()
        }
    }
}

struct EchoLlm;

#[async_trait]
impl TextGenerator for EchoLlm {
    fn configured(&self) -> bool {
        true
    }

    async fn generate(&self, text: &str, _conversation_id: &str) -> std::result::Result<String, GenerationError> {
        Ok(format!("Sure: {}", text))
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth::healthy()
    }
}

struct ToneTts;

#[async_trait]
impl SpeechSynthesizer for ToneTts {
    fn ready(&self) -> bool {
        true
    }

    async fn synthesize(&self, _text: &str, _speed: f32) -> Result<SynthesizedAudio> {
        Ok(SynthesizedAudio { sample_rate: 24_000, samples: vec![0.25; 24_000] })
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth::healthy()
    }
}

fn app_with(stt: ScriptedStt, config: OrchestratorConfig) -> Router {
    let orchestrator = Orchestrator::new(Arc::new(stt), Arc::new(EchoLlm), Arc::new(ToneTts), config);
    create_router(AppState::new(Settings::default(), Arc::new(orchestrator)))
}

fn app() -> Router {
    app_with(ScriptedStt { ready: true, delay: Duration::ZERO }, OrchestratorConfig::default())
}

fn multipart_request(filename: Option<&str>, speed: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(filename) = filename {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&[1u8, 2, 3, 4, 5, 6, 7, 8]);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(speed) = speed {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"speed\"\r\n\r\n{speed}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/orchestrator/dialogue")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_dialogue_returns_wav_with_timing_headers() {
    let response = app().oneshot(multipart_request(Some("question.wav"), Some("1.0"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(headers["x-sample-rate"], "24000");
    assert_eq!(headers["x-output-duration"], "1.000");
    assert!(headers.contains_key("x-processing-time-total"));
    assert!(headers.contains_key("x-processing-time-stt"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
}

#[tokio::test]
async fn test_out_of_range_speed_is_rejected() {
    let response = app().oneshot(multipart_request(Some("question.wav"), Some("5.0"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("Speed must be between"));
}

#[tokio::test]
async fn test_missing_audio_field_is_rejected() {
    let response = app().oneshot(multipart_request(None, Some("1.0"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_unsupported_format_maps_to_client_error() {
    let response = app().oneshot(multipart_request(Some("notes.txt"), None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_AUDIO_FORMAT");
}

#[tokio::test]
async fn test_status_reports_permits() {
    let response = app()
        .oneshot(Request::get("/api/orchestrator/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["overall"], "healthy");
    assert_eq!(body["available_permits"], 5);
    assert_eq!(body["max_concurrent"], 5);
}

#[tokio::test]
async fn test_unready_recognizer_fails_readiness_and_status() {
    let app = app_with(ScriptedStt { ready: false, delay: Duration::ZERO }, OrchestratorConfig::default());

    let ready = app
        .clone()
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(ready).await["ready"], false);

    let status = app
        .clone()
        .oneshot(Request::get("/api/orchestrator/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::SERVICE_UNAVAILABLE);

    let dialogue = app.oneshot(multipart_request(Some("question.wav"), None)).await.unwrap();
    assert_eq!(dialogue.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(dialogue).await["error"]["code"], "STT_SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_health_is_liveness_only() {
    let app = app_with(ScriptedStt { ready: false, delay: Duration::ZERO }, OrchestratorConfig::default());
    let response = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_saturated_pool_answers_with_retry_after() {
    let config = OrchestratorConfig {
        max_concurrent: 1,
        admission_grace_ms: 20,
        ..OrchestratorConfig::default()
    };
    let app = app_with(ScriptedStt { ready: true, delay: Duration::from_millis(400) }, config);

    let slow = tokio::spawn(app.clone().oneshot(multipart_request(Some("first.wav"), None)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rejected = app.oneshot(multipart_request(Some("second.wav"), None)).await.unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.headers()[header::RETRY_AFTER], "5");
    assert_eq!(json_body(rejected).await["error"]["code"], "TOO_MANY_REQUESTS");

    let first = slow.await.unwrap().unwrap();
    assert_eq!(first.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_without_recorder() {
    let response = app().oneshot(Request::get("/metrics").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
