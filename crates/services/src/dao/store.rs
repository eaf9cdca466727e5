use async_trait::async_trait;
use callroom_db::models::{Room, TranscriptionChunk, TranscriptionSession};

use super::base::DaoResult;

/// The narrow slice of the durable store the realtime subsystem reads and
/// writes. Rooms and transcription sessions are created and ended elsewhere.
#[async_trait]
pub trait CallStore: Send + Sync + 'static {
    /// Looks a room up regardless of its `active` flag.
    async fn get_room(&self, room_id: &str) -> DaoResult<Option<Room>>;

    /// Returns the room only while it is active.
    async fn get_active_room(&self, room_id: &str) -> DaoResult<Option<Room>>;

    /// Creates or updates the durable participant row. `in_call = true`
    /// clears `left_at`; `in_call = false` stamps it.
    async fn upsert_participant(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
        in_call: bool,
    ) -> DaoResult<()>;

    async fn is_participant_in_call(&self, room_id: &str, user_id: &str) -> DaoResult<bool>;

    /// Marks the room inactive and stamps `ended_at`. Returns `false` when it
    /// was already inactive or does not exist.
    async fn deactivate_room(&self, room_id: &str) -> DaoResult<bool>;

    async fn get_session(&self, session_id: &str) -> DaoResult<Option<TranscriptionSession>>;

    async fn get_active_session(&self, room_id: &str) -> DaoResult<Option<TranscriptionSession>>;

    async fn append_transcription_chunk(&self, chunk: TranscriptionChunk) -> DaoResult<()>;

    async fn bump_session_word_count(&self, session_id: &str, delta: i64) -> DaoResult<()>;

    async fn set_transcription_status(
        &self,
        room_id: &str,
        user_id: &str,
        enabled: bool,
        language: Option<&str>,
    ) -> DaoResult<()>;
}
