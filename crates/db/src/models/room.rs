use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

/// A call room. Created and owned by the REST layer; the realtime side only
/// reads it on admission and flips `active`/`ended_at` when the last live
/// participant leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Stable external key clients connect with.
    pub room_id: String,
    pub name: String,
    pub creator_id: String,
    #[serde(default = "default_max_participants")]
    pub max_participants: u32,
    #[serde(default)]
    pub settings: Document,
    #[serde(default)]
    pub active: bool,
    pub created_at: DateTime,
    pub ended_at: Option<DateTime>,
}

impl Room {
    pub const COLLECTION: &'static str = "rooms";

    pub fn new(room_id: impl Into<String>, name: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self {
            id: None,
            room_id: room_id.into(),
            name: name.into(),
            creator_id: creator_id.into(),
            max_participants: default_max_participants(),
            settings: Document::new(),
            active: true,
            created_at: DateTime::now(),
            ended_at: None,
        }
    }
}

fn default_max_participants() -> u32 {
    10
}
