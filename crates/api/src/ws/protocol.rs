//! JSON wire protocol for both WebSocket endpoints.
//!
//! Every frame is one JSON object with a string `type`. Known kinds decode
//! into a closed enum per endpoint; anything else is kept as raw JSON so the
//! call-room endpoint can pass it through and the transcription endpoint can
//! echo `unknown_message`.

use callroom_transcription::AudioFormat;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// A pre-serialized outbound text frame, encoded once and shared by every
/// recipient of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pass-through frames are built from the sender's own JSON object.
    pub fn from_object(body: Map<String, Value>) -> Self {
        Frame(Value::Object(body).to_string())
    }
}

impl From<&ServerMessage> for Frame {
    fn from(message: &ServerMessage) -> Self {
        Frame(serde_json::to_string(message).unwrap_or_default())
    }
}

/// Result of decoding one inbound frame.
#[derive(Debug)]
pub enum Inbound<T> {
    Known(T),
    /// A well-formed object whose `type` is not handled by this endpoint.
    Other {
        kind: String,
        body: Map<String, Value>,
    },
}

/// Message enums that can be decoded by [`decode`].
pub trait MessageKinds: DeserializeOwned {
    /// Values of `type` this enum has a variant for.
    const KINDS: &'static [&'static str];
}

pub fn decode<T: MessageKinds>(text: &str) -> Result<Inbound<T>, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let Value::Object(body) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let kind = match body.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingType),
    };

    if !T::KINDS.contains(&kind.as_str()) {
        return Ok(Inbound::Other { kind, body });
    }

    serde_json::from_value(Value::Object(body))
        .map(Inbound::Known)
        .map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

fn default_true() -> bool {
    true
}

// ---- inbound -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SignalMessage {
    pub target_user: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionUpdate {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default = "default_true")]
    pub is_final: bool,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioChunk {
    /// Base64, optionally as a `data:` URL.
    #[serde(default)]
    pub audio_data: String,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Inbound messages on `/ws/room`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallRoomMessage {
    Join,
    Leave,
    Ping,
    ChatMessage {
        message: String,
    },
    Offer(SignalMessage),
    Answer(SignalMessage),
    #[serde(rename = "ice-candidate")]
    IceCandidate(SignalMessage),
    TranscriptionUpdate(TranscriptionUpdate),
    TranscriptionStatus {
        enabled: bool,
        #[serde(default)]
        language: Option<String>,
    },
    AudioChunk(AudioChunk),
}

impl MessageKinds for CallRoomMessage {
    const KINDS: &'static [&'static str] = &[
        "join",
        "leave",
        "ping",
        "chat_message",
        "offer",
        "answer",
        "ice-candidate",
        "transcription_update",
        "transcription_status",
        "audio_chunk",
    ];
}

/// Inbound messages on `/ws/transcription`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptionMessage {
    StartRecording,
    AudioChunk(AudioChunk),
    StopRecording,
    Ping,
}

impl MessageKinds for TranscriptionMessage {
    const KINDS: &'static [&'static str] = &["start_recording", "audio_chunk", "stop_recording", "ping"];
}

// ---- outbound ------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayedSignal {
    pub from_user: String,
    pub from_display_name: String,
    pub target_user: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    UserJoined {
        user_id: String,
        display_name: String,
        timestamp: DateTime<Utc>,
    },
    JoinedRoom {
        room_id: String,
        user_id: String,
        participants: Vec<ParticipantInfo>,
    },
    UserLeft {
        user_id: String,
        display_name: String,
        timestamp: DateTime<Utc>,
    },
    ChatMessage {
        user_id: String,
        display_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    TranscriptionReceived {
        user_id: String,
        display_name: String,
        text: String,
        confidence: f64,
        is_final: bool,
        language: Option<String>,
        timestamp: DateTime<Utc>,
    },
    UserTranscriptionStatus {
        user_id: String,
        display_name: String,
        enabled: bool,
        language: Option<String>,
    },
    Offer(RelayedSignal),
    Answer(RelayedSignal),
    #[serde(rename = "ice-candidate")]
    IceCandidate(RelayedSignal),
    SessionStarted {
        session_id: String,
        room_id: String,
        language: String,
    },
    RecordingStarted {
        timestamp: DateTime<Utc>,
    },
    ChunkReceived {
        timestamp: DateTime<Utc>,
    },
    Transcription {
        text: String,
        confidence: f64,
        is_final: bool,
        engine: String,
        language: Option<String>,
        speaker_name: String,
        timestamp: DateTime<Utc>,
    },
    RecordingStopped {
        timestamp: DateTime<Utc>,
    },
    UnknownMessage {
        received_type: String,
    },
    Error {
        message: String,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn signal(kind: SignalKind, signal: RelayedSignal) -> Self {
        match kind {
            SignalKind::Offer => ServerMessage::Offer(signal),
            SignalKind::Answer => ServerMessage::Answer(signal),
            SignalKind::IceCandidate => ServerMessage::IceCandidate(signal),
        }
    }

    pub fn frame(&self) -> Frame {
        Frame::from(self)
    }
}
