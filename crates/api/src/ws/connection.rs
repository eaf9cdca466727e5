use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::Mutex;
use tracing::debug;

use super::protocol::Frame;
use crate::error::SendError;

/// One participant's outbound channel. Failures are returned to the caller
/// and never propagate across the room.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Unique per physical connection, stable for its lifetime.
    fn id(&self) -> &str;

    /// Bounded by the transport's send timeout. No retries.
    async fn send(&self, frame: &Frame) -> Result<(), SendError>;

    async fn close(&self, code: u16, reason: &str);
}

/// [`ConnectionHandle`] over the write half of an axum WebSocket.
pub struct WsConnection {
    id: String,
    sender: Mutex<SplitSink<WebSocket, Message>>,
    send_timeout: Duration,
    closed: AtomicBool,
}

impl WsConnection {
    pub fn new(id: String, sender: SplitSink<WebSocket, Message>, send_timeout: Duration) -> Self {
        Self {
            id,
            sender: Mutex::new(sender),
            send_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub async fn pong(&self, data: Bytes) {
        let mut guard = self.sender.lock().await;
        let _ = guard.send(Message::Pong(data)).await;
    }

    async fn write(&self, message: Message) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let write = async {
            let mut guard = self.sender.lock().await;
            guard.send(message).await
        };
        match tokio::time::timeout(self.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendError::Transport(e.to_string())),
            Err(_) => Err(SendError::Timeout(self.send_timeout)),
        }
    }
}

#[async_trait]
impl ConnectionHandle for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, frame: &Frame) -> Result<(), SendError> {
        self.write(Message::text(frame.as_str().to_owned())).await
    }

    async fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.write(Message::Close(Some(frame))).await {
            debug!(connection_id = %self.id, %e, "Close frame not delivered");
        }
        self.closed.store(true, Ordering::Release);
    }
}
