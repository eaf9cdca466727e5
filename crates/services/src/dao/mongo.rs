use async_trait::async_trait;
use bson::{DateTime, doc};
use callroom_db::models::{CallParticipant, Room, TranscriptionChunk, TranscriptionSession};
use mongodb::{Collection, Database, options::UpdateOptions};

use super::base::{DaoError, DaoResult};
use super::store::CallStore;

pub struct MongoCallStore {
    rooms: Collection<Room>,
    participants: Collection<CallParticipant>,
    sessions: Collection<TranscriptionSession>,
    chunks: Collection<TranscriptionChunk>,
}

impl MongoCallStore {
    pub fn new(db: &Database) -> Self {
        Self {
            rooms: db.collection(Room::COLLECTION),
            participants: db.collection(CallParticipant::COLLECTION),
            sessions: db.collection(TranscriptionSession::COLLECTION),
            chunks: db.collection(TranscriptionChunk::COLLECTION),
        }
    }
}

#[async_trait]
impl CallStore for MongoCallStore {
    async fn get_room(&self, room_id: &str) -> DaoResult<Option<Room>> {
        Ok(self.rooms.find_one(doc! { "room_id": room_id }).await?)
    }

    async fn get_active_room(&self, room_id: &str) -> DaoResult<Option<Room>> {
        Ok(self
            .rooms
            .find_one(doc! { "room_id": room_id, "active": true })
            .await?)
    }

    async fn upsert_participant(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
        in_call: bool,
    ) -> DaoResult<()> {
        let now = DateTime::now();
        let filter = doc! { "room_id": room_id, "user_id": user_id };
        let update = if in_call {
            doc! {
                "$set": {
                    "display_name": display_name,
                    "is_currently_in_call": true,
                    "joined_at": now,
                    "left_at": null,
                    "updated_at": now,
                },
                "$setOnInsert": {
                    "transcription_enabled": false,
                    "transcription_language": null,
                    "created_at": now,
                },
            }
        } else {
            // A leave without a prior row still leaves an auditable record.
            doc! {
                "$set": {
                    "is_currently_in_call": false,
                    "left_at": now,
                    "updated_at": now,
                },
                "$setOnInsert": {
                    "display_name": display_name,
                    "joined_at": now,
                    "transcription_enabled": false,
                    "transcription_language": null,
                    "created_at": now,
                },
            }
        };

        let opts = UpdateOptions::builder().upsert(true).build();
        self.participants
            .update_one(filter, update)
            .with_options(opts)
            .await?;
        Ok(())
    }

    async fn is_participant_in_call(&self, room_id: &str, user_id: &str) -> DaoResult<bool> {
        let count = self
            .participants
            .count_documents(doc! {
                "room_id": room_id,
                "user_id": user_id,
                "is_currently_in_call": true,
            })
            .await?;
        Ok(count > 0)
    }

    async fn deactivate_room(&self, room_id: &str) -> DaoResult<bool> {
        let result = self
            .rooms
            .update_one(
                doc! { "room_id": room_id, "active": true },
                doc! { "$set": { "active": false, "ended_at": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn get_session(&self, session_id: &str) -> DaoResult<Option<TranscriptionSession>> {
        Ok(self
            .sessions
            .find_one(doc! { "session_id": session_id })
            .await?)
    }

    async fn get_active_session(&self, room_id: &str) -> DaoResult<Option<TranscriptionSession>> {
        Ok(self
            .sessions
            .find_one(doc! { "room_id": room_id, "active": true })
            .await?)
    }

    async fn append_transcription_chunk(&self, chunk: TranscriptionChunk) -> DaoResult<()> {
        self.chunks.insert_one(&chunk).await?;
        Ok(())
    }

    async fn bump_session_word_count(&self, session_id: &str, delta: i64) -> DaoResult<()> {
        let result = self
            .sessions
            .update_one(
                doc! { "session_id": session_id },
                doc! { "$inc": { "total_words": delta } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(DaoError::NotFound);
        }
        Ok(())
    }

    async fn set_transcription_status(
        &self,
        room_id: &str,
        user_id: &str,
        enabled: bool,
        language: Option<&str>,
    ) -> DaoResult<()> {
        let result = self
            .participants
            .update_one(
                doc! { "room_id": room_id, "user_id": user_id },
                doc! {
                    "$set": {
                        "transcription_enabled": enabled,
                        "transcription_language": language,
                        "updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(DaoError::NotFound);
        }
        Ok(())
    }
}
