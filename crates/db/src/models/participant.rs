use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Durable join/leave history for one user in one room. A re-join reuses the
/// same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParticipant {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub is_currently_in_call: bool,
    pub joined_at: DateTime,
    pub left_at: Option<DateTime>,
    #[serde(default)]
    pub transcription_enabled: bool,
    pub transcription_language: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl CallParticipant {
    pub const COLLECTION: &'static str = "call_participants";

    pub fn joined(room_id: &str, user_id: &str, display_name: &str) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            is_currently_in_call: true,
            joined_at: now,
            left_at: None,
            transcription_enabled: false,
            transcription_language: None,
            created_at: now,
            updated_at: now,
        }
    }
}
