//! Streaming Session Management
//!
//! One session per live duplex connection. The manager owns the registry,
//! the per-session heartbeat tasks and the delivery path; the connection
//! itself is abstracted behind [`Transport`].
//!
//! Lifecycle: `connect` → (heartbeat running) → `disconnect`. There is no
//! reconnection; a session whose transport fails is torn down and the client
//! must open a new one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::protocol::{ProcessingStatus, ServerMessage, WsErrorCode};
use crate::TransportError;

/// Outbound half of a duplex connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one message; messages to one transport are delivered in call order
    async fn send(&self, message: &ServerMessage) -> Result<(), TransportError>;

    /// Close the connection; must tolerate an already-closed peer
    async fn close(&self);
}

/// Registered session
pub struct StreamSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
    transport: Arc<dyn Transport>,
    heartbeat: Mutex<Option<watch::Sender<bool>>>,
}

impl StreamSession {
    fn new(id: String, transport: Arc<dyn Transport>) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: RwLock::new(now),
            transport,
            heartbeat: Mutex::new(None),
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    fn stop_heartbeat(&self) {
        if let Some(shutdown) = self.heartbeat.lock().take() {
            let _ = shutdown.send(true);
        }
    }
}

/// Registry of live streaming sessions
#[derive(Default)]
pub struct StreamSessionManager {
    sessions: RwLock<HashMap<String, Arc<StreamSession>>>,
}

impl StreamSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport and acknowledge it with the new session id
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(StreamSession::new(id.clone(), transport));
        self.sessions.write().insert(id.clone(), session);

        tracing::info!(session_id = %id, active = self.session_count(), "Session connected");

        self.send(&id, &ServerMessage::connection_ack(&id)).await;
        id
    }

    /// Tear a session down; unknown ids are ignored
    ///
    /// Returns whether a session was removed.
    pub async fn disconnect(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                session.stop_heartbeat();
                session.transport.close().await;
                tracing::info!(session_id = %id, active = self.session_count(), "Session disconnected");
                true
            },
            None => false,
        }
    }

    /// Deliver one message; on a write failure the session is torn down
    pub async fn send(&self, id: &str, message: &ServerMessage) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };

        match session.transport.send(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    session_id = %id,
                    message_type = message.kind(),
                    error = %e,
                    "Send failed, disconnecting"
                );
                self.disconnect(id).await;
                false
            },
        }
    }

    /// Send to every session registered at call time
    ///
    /// Returns the number of successful deliveries.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        let mut delivered = 0;
        for id in ids {
            if self.send(&id, message).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Start the keep-alive loop for a session, at most once
    ///
    /// Returns `false` when the session is unknown or already has a heartbeat.
    pub fn start_heartbeat(self: &Arc<Self>, id: &str, interval: Duration) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };

        let mut shutdown_rx = {
            let mut slot = session.heartbeat.lock();
            if slot.is_some() {
                return false;
            }
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            *slot = Some(shutdown_tx);
            shutdown_rx
        };

        let manager = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if !manager.contains(&id) || !manager.send(&id, &ServerMessage::ping()).await {
                            break;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(session_id = %id, "Heartbeat stopped");
        });

        true
    }

    pub async fn send_status(&self, id: &str, status: ProcessingStatus) -> bool {
        self.send(id, &ServerMessage::status(status)).await
    }

    pub async fn send_error(
        &self,
        id: &str,
        code: WsErrorCode,
        message: impl Into<String>,
        recoverable: bool,
        details: Option<Map<String, Value>>,
    ) -> bool {
        self.send(id, &ServerMessage::error(code, message, recoverable, details))
            .await
    }

    /// Record inbound activity
    pub fn touch(&self, id: &str) {
        if let Some(session) = self.get(id) {
            session.touch();
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<ServerMessage>>,
        broken: AtomicBool,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, message: &ServerMessage) -> Result<(), TransportError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_connect_sends_ack() {
        let manager = StreamSessionManager::new();
        let transport = Arc::new(RecordingTransport::default());
        let id = manager.connect(transport.clone()).await;

        assert!(manager.contains(&id));
        let sent = transport.sent.lock();
        assert!(matches!(&sent[0], ServerMessage::ConnectionAck { session_id, .. } if *session_id == id));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let manager = StreamSessionManager::new();
        let transport = Arc::new(RecordingTransport::default());
        let id = manager.connect(transport.clone()).await;

        assert!(manager.disconnect(&id).await);
        assert!(!manager.disconnect(&id).await);
        assert!(!manager.disconnect("never-registered").await);
        assert_eq!(manager.session_count(), 0);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_send_tears_down() {
        let manager = StreamSessionManager::new();
        let transport = Arc::new(RecordingTransport::default());
        let id = manager.connect(transport.clone()).await;

        transport.broken.store(true, Ordering::SeqCst);
        assert!(!manager.send_status(&id, ProcessingStatus::Idle).await);
        assert!(!manager.contains(&id));
        assert!(!manager.send(&id, &ServerMessage::ping()).await);
    }

    #[tokio::test]
    async fn test_broadcast_counts_successes() {
        let manager = StreamSessionManager::new();
        let good = Arc::new(RecordingTransport::default());
        let bad = Arc::new(RecordingTransport::default());
        manager.connect(good.clone()).await;
        let bad_id = manager.connect(bad.clone()).await;
        manager.connect(Arc::new(RecordingTransport::default())).await;

        bad.broken.store(true, Ordering::SeqCst);
        let delivered = manager.broadcast(&ServerMessage::ping()).await;

        assert_eq!(delivered, 2);
        assert!(!manager.contains(&bad_id));
        assert_eq!(manager.session_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_until_disconnect() {
        let manager = Arc::new(StreamSessionManager::new());
        let transport = Arc::new(RecordingTransport::default());
        let id = manager.connect(transport.clone()).await;

        assert!(manager.start_heartbeat(&id, Duration::from_secs(30)));
        assert!(!manager.start_heartbeat(&id, Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_secs(95)).await;
        let pings = |t: &RecordingTransport| {
            t.sent.lock().iter().filter(|m| matches!(m, ServerMessage::Ping { .. })).count()
        };
        assert_eq!(pings(transport.as_ref()), 3);

        manager.disconnect(&id).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(pings(transport.as_ref()), 3);
    }

    #[tokio::test]
    async fn test_heartbeat_requires_session() {
        let manager = Arc::new(StreamSessionManager::new());
        assert!(!manager.start_heartbeat("missing", Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_touch_updates_activity() {
        let manager = StreamSessionManager::new();
        let id = manager.connect(Arc::new(RecordingTransport::default())).await;
        let before = manager.get(&id).unwrap().last_activity();
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.touch(&id);
        assert!(manager.get(&id).unwrap().last_activity() > before);
    }
}
