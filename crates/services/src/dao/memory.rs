use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::DateTime;
use callroom_db::models::{CallParticipant, Room, TranscriptionChunk, TranscriptionSession};
use dashmap::DashMap;

use super::base::{DaoError, DaoResult};
use super::store::CallStore;

/// Process-local store used when no database is configured, and by tests.
///
/// Writes can be made to fail on demand to exercise the best-effort
/// persistence paths.
#[derive(Default)]
pub struct MemoryCallStore {
    rooms: DashMap<String, Room>,
    /// (room_id, user_id) -> participant row
    participants: DashMap<(String, String), CallParticipant>,
    sessions: DashMap<String, TranscriptionSession>,
    /// session_id -> chunks in append order
    chunks: DashMap<String, Vec<TranscriptionChunk>>,
    fail_writes: AtomicBool,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_room(&self, room: Room) {
        self.rooms.insert(room.room_id.clone(), room);
    }

    pub fn insert_session(&self, session: TranscriptionSession) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn room(&self, room_id: &str) -> Option<Room> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    pub fn session(&self, session_id: &str) -> Option<TranscriptionSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn participant(&self, room_id: &str, user_id: &str) -> Option<CallParticipant> {
        self.participants
            .get(&(room_id.to_string(), user_id.to_string()))
            .map(|p| p.clone())
    }

    pub fn chunks(&self, session_id: &str) -> Vec<TranscriptionChunk> {
        self.chunks
            .get(session_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> DaoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DaoError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn get_room(&self, room_id: &str) -> DaoResult<Option<Room>> {
        Ok(self.room(room_id))
    }

    async fn get_active_room(&self, room_id: &str) -> DaoResult<Option<Room>> {
        Ok(self.room(room_id).filter(|r| r.active))
    }

    async fn upsert_participant(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
        in_call: bool,
    ) -> DaoResult<()> {
        self.check_writable()?;
        let now = DateTime::now();
        self.participants
            .entry((room_id.to_string(), user_id.to_string()))
            .and_modify(|p| {
                p.display_name = display_name.to_string();
                p.is_currently_in_call = in_call;
                if in_call {
                    p.joined_at = now;
                    p.left_at = None;
                } else {
                    p.left_at = Some(now);
                }
                p.updated_at = now;
            })
            .or_insert_with(|| {
                let mut p = CallParticipant::joined(room_id, user_id, display_name);
                if !in_call {
                    p.is_currently_in_call = false;
                    p.left_at = Some(now);
                }
                p
            });
        Ok(())
    }

    async fn is_participant_in_call(&self, room_id: &str, user_id: &str) -> DaoResult<bool> {
        Ok(self
            .participant(room_id, user_id)
            .is_some_and(|p| p.is_currently_in_call))
    }

    async fn deactivate_room(&self, room_id: &str) -> DaoResult<bool> {
        self.check_writable()?;
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return Ok(false);
        };
        if !room.active {
            return Ok(false);
        }
        room.active = false;
        room.ended_at = Some(DateTime::now());
        Ok(true)
    }

    async fn get_session(&self, session_id: &str) -> DaoResult<Option<TranscriptionSession>> {
        Ok(self.session(session_id))
    }

    async fn get_active_session(&self, room_id: &str) -> DaoResult<Option<TranscriptionSession>> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.room_id == room_id && s.active)
            .map(|s| s.clone()))
    }

    async fn append_transcription_chunk(&self, chunk: TranscriptionChunk) -> DaoResult<()> {
        self.check_writable()?;
        self.chunks
            .entry(chunk.session_id.clone())
            .or_default()
            .push(chunk);
        Ok(())
    }

    async fn bump_session_word_count(&self, session_id: &str, delta: i64) -> DaoResult<()> {
        self.check_writable()?;
        let mut session = self.sessions.get_mut(session_id).ok_or(DaoError::NotFound)?;
        session.total_words += delta;
        Ok(())
    }

    async fn set_transcription_status(
        &self,
        room_id: &str,
        user_id: &str,
        enabled: bool,
        language: Option<&str>,
    ) -> DaoResult<()> {
        self.check_writable()?;
        let mut participant = self
            .participants
            .get_mut(&(room_id.to_string(), user_id.to_string()))
            .ok_or(DaoError::NotFound)?;
        participant.transcription_enabled = enabled;
        participant.transcription_language = language.map(str::to_string);
        participant.updated_at = DateTime::now();
        Ok(())
    }
}
