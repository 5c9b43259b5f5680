//! WebSocket Handler
//!
//! Realtime dialogue over `/ws/realtime`: the client streams PCM16 chunks,
//! the server answers with per-stage status updates, the transcript, the
//! reply text and the synthesized audio.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::future::BoxFuture;
use futures::stream::SplitSink;
use futures::{FutureExt, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use voice_dialogue_core::pcm16_to_wav;
use voice_dialogue_pipeline::{DialogueStage, ErrorKind, OrchestratorError, StageObserver};
use voice_dialogue_transport::{
    parse_client_message, ClientMessage, ProcessingStatus, ProtocolLimits, ServerMessage, StreamFormat,
    Transport, TransportError, WsErrorCode,
};

use crate::metrics::{record_error, record_request, record_stage_timings, set_active_sessions};
use crate::state::AppState;

/// Filename handed to the orchestrator for streamed audio
const STREAM_FILENAME: &str = "stream.wav";

/// A dialogue turn running on behalf of one session
type Turn = BoxFuture<'static, ()>;

/// `Transport` over the sending half of an axum WebSocket
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink: Mutex::new(sink) }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, message: &ServerMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.close().await;
    }
}

/// `GET /ws/realtime`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let session_id = state.sessions.connect(Arc::new(WsTransport::new(sink))).await;
    serve_session(state, session_id, stream).await;
}

/// Drive a connected session until its inbound frames end
///
/// Inbound frames keep being read while a turn runs. When the client cancels
/// or goes away the turn future is dropped on the spot, which releases its
/// admission permit and skips the stages it had not reached.
pub async fn serve_session<S>(state: AppState, session_id: String, mut inbound: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    set_active_sessions(state.sessions.session_count());

    let (heartbeat, limits, buffer_limits) = {
        let config = state.get_config();
        (
            config.websocket.heartbeat_interval(),
            ProtocolLimits::with_max_stream_secs(config.websocket.max_stream_secs),
            BufferLimits {
                max_bytes: config.websocket.max_buffer_bytes,
                max_secs: config.websocket.max_stream_secs,
            },
        )
    };
    state.sessions.start_heartbeat(&session_id, heartbeat);
    state.sessions.send_status(&session_id, ProcessingStatus::Idle).await;

    let mut dialogue = StreamingDialogue::new(state.clone(), session_id.clone(), buffer_limits);
    let mut turn: Option<Turn> = None;

    loop {
        tokio::select! {
            frame = inbound.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %session_id, error = %e, "WebSocket receive failed");
                        break;
                    },
                    None => break,
                };
                state.sessions.touch(&session_id);

                match frame {
                    Message::Text(text) => match parse_client_message(&text, &limits) {
                        Ok(ClientMessage::Cancel { reason }) => {
                            if turn.take().is_some() {
                                tracing::info!(session_id = %session_id, "In-flight turn dropped");
                            }
                            dialogue.cancel(reason).await;
                        },
                        Ok(message) => {
                            if let Some(next) = dialogue.handle(message, turn.is_some()).await {
                                turn = Some(next);
                            }
                        },
                        Err(e) => {
                            dialogue.ctx.error(WsErrorCode::InvalidMessage, e.to_string(), true).await;
                        },
                    },
                    Message::Binary(_) => {
                        dialogue
                            .ctx
                            .error(WsErrorCode::InvalidMessage, "Binary frames are not supported", true)
                            .await;
                    },
                    Message::Close(_) => break,
                    _ => {},
                }
            }
            () = run_turn(&mut turn) => {
                turn = None;
            }
        }

        if !state.sessions.contains(&session_id) {
            break;
        }
    }

    if turn.take().is_some() {
        tracing::info!(session_id = %session_id, "Session ended with a turn in flight");
    }
    state.sessions.disconnect(&session_id).await;
    set_active_sessions(state.sessions.session_count());
}

/// Resolves when the current turn finishes; never resolves when idle
async fn run_turn(turn: &mut Option<Turn>) {
    match turn {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

/// Forwards orchestrator stage transitions as status updates
struct ChannelObserver(mpsc::UnboundedSender<ProcessingStatus>);

impl StageObserver for ChannelObserver {
    fn on_stage(&self, stage: DialogueStage) {
        let status = match stage {
            DialogueStage::Transcribing => ProcessingStatus::Transcribing,
            DialogueStage::Generating => ProcessingStatus::Generating,
            DialogueStage::Synthesizing => ProcessingStatus::Synthesizing,
        };
        let _ = self.0.send(status);
    }
}

/// Protocol code and recoverability for an orchestrator failure
pub fn ws_error_code(kind: ErrorKind) -> WsErrorCode {
    match kind {
        ErrorKind::InvalidAudioFormat => WsErrorCode::InvalidAudioFormat,
        ErrorKind::AudioTooShort => WsErrorCode::AudioTooShort,
        ErrorKind::AudioTooLong => WsErrorCode::AudioTooLong,
        ErrorKind::SpeechRecognitionFailed | ErrorKind::SttServiceUnavailable => WsErrorCode::SttServiceError,
        ErrorKind::LlmServiceUnavailable | ErrorKind::LlmConnectionError => WsErrorCode::LlmServiceError,
        ErrorKind::LlmRateLimited => WsErrorCode::LlmRateLimited,
        ErrorKind::TtsServiceUnavailable | ErrorKind::SynthesisFailed => WsErrorCode::TtsServiceError,
        ErrorKind::TooManyRequests | ErrorKind::ProcessingTimeout => WsErrorCode::InternalError,
    }
}

/// Bounds on audio buffered for one utterance
#[derive(Debug, Clone, Copy)]
struct BufferLimits {
    max_bytes: usize,
    max_secs: u64,
}

impl BufferLimits {
    /// Byte budget at `sample_rate`: the smaller of the byte cap and the duration cap
    fn bytes_at(&self, sample_rate: u32) -> usize {
        let duration_bytes = self.max_secs.saturating_mul(u64::from(sample_rate)).saturating_mul(2);
        self.max_bytes.min(usize::try_from(duration_bytes).unwrap_or(usize::MAX))
    }
}

/// Session handle shared by the receive loop and the turns it starts
#[derive(Clone)]
struct TurnContext {
    state: AppState,
    session_id: String,
}

impl TurnContext {
    async fn voice_turn(self, wav: Vec<u8>, speed: f32) {
        let orchestrator = Arc::clone(&self.state.orchestrator);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver(tx);

        let run = async move {
            let result = orchestrator
                .run_with_observer(&wav, STREAM_FILENAME, speed, &observer)
                .await;
            drop(observer);
            result
        };
        let forward = async {
            while let Some(status) = rx.recv().await {
                self.status(status).await;
            }
        };
        let (result, ()) = tokio::join!(run, forward);

        match result {
            Ok(outcome) => {
                record_request("ws_dialogue", "success");
                record_stage_timings(&outcome.metadata);

                let duration_ms = (outcome.metadata.input_duration * 1000.0).round() as u64;
                self.send(&ServerMessage::transcript_final(&outcome.transcript, 1.0, duration_ms))
                    .await;
                self.send(&ServerMessage::response_complete(&outcome.reply, true))
                    .await;
                self.send(&ServerMessage::ResponseAudio {
                    data: BASE64.encode(&outcome.audio),
                    sample_rate: outcome.metadata.sample_rate,
                })
                .await;
            },
            Err(err) => {
                record_request("ws_dialogue", "error");
                self.orchestrator_error(err).await;
            },
        }
        self.status(ProcessingStatus::Idle).await;
    }

    async fn text_turn(self, content: String, conversation_id: String) {
        self.status(ProcessingStatus::Generating).await;

        match self.state.orchestrator.reply_text(&content, &conversation_id).await {
            Ok(reply) => {
                record_request("ws_text", "success");
                self.send(&ServerMessage::response_complete(reply, false)).await;
            },
            Err(err) => {
                record_request("ws_text", "error");
                self.orchestrator_error(err).await;
            },
        }
        self.status(ProcessingStatus::Idle).await;
    }

    async fn orchestrator_error(&self, err: OrchestratorError) {
        record_error(err.kind.code());
        let mut details = err.details.clone().unwrap_or_default();
        if let Some(seconds) = err.retry_after {
            details.insert("retry_after".to_string(), seconds.into());
        }
        let details = if details.is_empty() { None } else { Some(details) };
        let recoverable = err.is_retryable();

        self.state
            .sessions
            .send_error(&self.session_id, ws_error_code(err.kind), err.message, recoverable, details)
            .await;
    }

    async fn send(&self, message: &ServerMessage) {
        self.state.sessions.send(&self.session_id, message).await;
    }

    async fn status(&self, status: ProcessingStatus) {
        self.state.sessions.send_status(&self.session_id, status).await;
    }

    async fn error(&self, code: WsErrorCode, message: impl Into<String>, recoverable: bool) {
        self.state
            .sessions
            .send_error(&self.session_id, code, message, recoverable, None)
            .await;
    }
}

/// Per-connection dialogue state
struct StreamingDialogue {
    ctx: TurnContext,
    buffer: Vec<u8>,
    sample_rate: u32,
    limits: BufferLimits,
}

impl StreamingDialogue {
    fn new(state: AppState, session_id: String, limits: BufferLimits) -> Self {
        Self {
            ctx: TurnContext { state, session_id },
            buffer: Vec::new(),
            sample_rate: voice_dialogue_config::constants::audio::STREAM_SAMPLE_RATE,
            limits,
        }
    }

    /// Apply one message; returns the turn to run, if it starts one
    async fn handle(&mut self, message: ClientMessage, busy: bool) -> Option<Turn> {
        match message {
            ClientMessage::AudioChunk { data, chunk_index, sample_rate, format } => {
                self.audio_chunk(&data, chunk_index, sample_rate, format).await;
                None
            },
            ClientMessage::AudioEnd { total_chunks, total_duration_ms } => {
                tracing::debug!(
                    session_id = %self.ctx.session_id,
                    total_chunks,
                    total_duration_ms,
                    "Audio stream ended"
                );
                if busy {
                    self.reject_busy().await;
                    return None;
                }
                self.audio_end().await
            },
            ClientMessage::TextInput { content, conversation_id } => {
                if busy {
                    self.reject_busy().await;
                    return None;
                }
                let conversation_id = conversation_id.unwrap_or_else(|| self.ctx.session_id.clone());
                Some(self.ctx.clone().text_turn(content, conversation_id).boxed())
            },
            ClientMessage::Cancel { reason } => {
                self.cancel(reason).await;
                None
            },
            ClientMessage::Pong { timestamp } => {
                tracing::debug!(session_id = %self.ctx.session_id, client_time = %timestamp, "Pong received");
                None
            },
        }
    }

    async fn cancel(&mut self, reason: Option<String>) {
        tracing::info!(session_id = %self.ctx.session_id, reason = ?reason, "Cancel requested");
        self.buffer.clear();
        self.ctx.status(ProcessingStatus::Idle).await;
    }

    async fn reject_busy(&self) {
        self.ctx
            .error(WsErrorCode::InvalidMessage, "A dialogue turn is already in progress", true)
            .await;
    }

    async fn audio_chunk(&mut self, data: &str, chunk_index: u32, sample_rate: u32, format: StreamFormat) {
        if format != StreamFormat::Pcm16 {
            self.ctx
                .error(WsErrorCode::InvalidAudioFormat, "Only pcm16 audio streaming is supported", false)
                .await;
            return;
        }

        let bytes = match BASE64.decode(data) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.ctx
                    .error(WsErrorCode::InvalidMessage, "Invalid base64 audio data", true)
                    .await;
                return;
            },
        };

        let rate = if self.buffer.is_empty() { sample_rate } else { self.sample_rate };
        if self.buffer.len() + bytes.len() > self.limits.bytes_at(rate) {
            self.buffer.clear();
            self.ctx
                .error(WsErrorCode::AudioTooLong, "Audio stream exceeds buffer limit", false)
                .await;
            self.ctx.status(ProcessingStatus::Idle).await;
            return;
        }

        if self.buffer.is_empty() {
            self.sample_rate = sample_rate;
            self.ctx.status(ProcessingStatus::Recording).await;
        }
        self.buffer.extend_from_slice(&bytes);
        tracing::trace!(
            session_id = %self.ctx.session_id,
            chunk_index,
            buffered = self.buffer.len(),
            "Audio chunk"
        );
    }

    async fn audio_end(&mut self) -> Option<Turn> {
        let pcm = std::mem::take(&mut self.buffer);
        if pcm.is_empty() {
            self.ctx.error(WsErrorCode::AudioTooShort, "No audio received", false).await;
            self.ctx.status(ProcessingStatus::Idle).await;
            return None;
        }

        let wav = match pcm16_to_wav(self.sample_rate, &pcm) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(session_id = %self.ctx.session_id, error = %e, "Failed to wrap streamed audio");
                self.ctx.error(WsErrorCode::InternalError, "Failed to process audio", false).await;
                self.ctx.status(ProcessingStatus::Idle).await;
                return None;
            },
        };

        let speed = self.ctx.state.get_config().tts.default_speed;
        Some(self.ctx.clone().voice_turn(wav, speed).boxed())
    }
}
