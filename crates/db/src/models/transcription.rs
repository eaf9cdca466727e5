use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Room-scoped record that live transcription chunks are attributed to. At
/// most one is active per room; started and ended over REST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSession {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub session_id: String,
    pub room_id: String,
    #[serde(default)]
    pub active: bool,
    pub language: String,
    #[serde(default)]
    pub total_words: i64,
    #[serde(default)]
    pub participant_count: i32,
    pub started_at: DateTime,
    pub ended_at: Option<DateTime>,
}

impl TranscriptionSession {
    pub const COLLECTION: &'static str = "transcription_sessions";

    pub fn new(session_id: impl Into<String>, room_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            room_id: room_id.into(),
            active: true,
            language: language.into(),
            total_words: 0,
            participant_count: 0,
            started_at: DateTime::now(),
            ended_at: None,
        }
    }
}

/// A finalized piece of transcript. Interim results are never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionChunk {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub session_id: String,
    pub room_id: String,
    pub participant_id: String,
    pub speaker_name: String,
    pub text: String,
    pub confidence: f64,
    pub is_final: bool,
    pub language: Option<String>,
    pub word_count: i64,
    pub timestamp: DateTime,
}

impl TranscriptionChunk {
    pub const COLLECTION: &'static str = "transcription_chunks";
}

/// Number of whitespace-separated tokens, the unit of `total_words`.
pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}
