use std::time::Duration;

use axum::extract::ws::close_code;
use callroom_services::{AuthError, DaoError};

/// Application-specific WebSocket close codes (4000-4999 private range).
pub mod close_codes {
    pub const UNAUTHORIZED: u16 = 4001;
    pub const FORBIDDEN: u16 = 4003;
    pub const NOT_FOUND: u16 = 4004;
    pub const ROOM_FULL: u16 = 4009;
}

/// Why a freshly upgraded connection was refused. The connection is closed
/// with [`AdmissionError::close_code`] and nothing else is processed.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("authentication failed: {0}")]
    Unauthenticated(#[from] AuthError),
    #[error("not authorized for this room")]
    Forbidden,
    #[error("{0} not found or inactive")]
    NotFound(String),
    #[error("room is full ({0} participants)")]
    RoomFull(u32),
    #[error("store error: {0}")]
    Store(#[from] DaoError),
}

impl AdmissionError {
    pub fn close_code(&self) -> u16 {
        match self {
            AdmissionError::Unauthenticated(_) => close_codes::UNAUTHORIZED,
            AdmissionError::Forbidden => close_codes::FORBIDDEN,
            AdmissionError::NotFound(_) => close_codes::NOT_FOUND,
            AdmissionError::RoomFull(_) => close_codes::ROOM_FULL,
            AdmissionError::Store(_) => close_code::ERROR,
        }
    }
}

/// A frame that could not be understood. Answered with an `error` message;
/// the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("message must be a JSON object")]
    NotAnObject,
    #[error("message is missing a string `type` field")]
    MissingType,
    #[error("invalid `{kind}` message: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
    #[error("binary frames are not supported")]
    BinaryFrame,
}

/// Per-recipient delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}
