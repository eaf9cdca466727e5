use std::sync::Arc;

use callroom_db::models::Room;
use callroom_services::Identity;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use super::dispatcher::{broadcast, relay, send_to_connection};
use super::protocol::{
    AudioChunk, CallRoomMessage, Inbound, ParticipantInfo, ServerMessage, SignalKind, SignalMessage,
    TranscriptionUpdate, decode,
};
use super::registry::LiveParticipant;
use super::transcription::{Speaker, persist_final_text, process_audio_chunk};
use crate::error::{AdmissionError, ProtocolError};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoRoom,
    Joined,
    Left,
}

/// One connection's membership of one call room.
///
/// Drives `NoRoom -> Joined -> Left (-> Joined ...)` and routes every
/// inbound frame of the connection. Messages are handled one at a time in
/// receive order.
pub struct CallSession {
    app: AppState,
    room_id: String,
    max_participants: u32,
    identity: Identity,
    connection: Arc<dyn ConnectionHandle>,
    state: SessionState,
    transcription_language: Option<String>,
}

impl CallSession {
    pub fn new(app: AppState, room: &Room, identity: Identity, connection: Arc<dyn ConnectionHandle>) -> Self {
        Self {
            app,
            room_id: room.room_id.clone(),
            max_participants: room.max_participants,
            identity,
            connection,
            state: SessionState::NoRoom,
            transcription_language: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Records the durable join, registers the connection in the room,
    /// announces it to the others and sends the welcome.
    ///
    /// The room must still be active once this room's transition lock is
    /// held, so a join cannot slip in behind a concurrent last leave.
    pub async fn join(&mut self) -> Result<(), AdmissionError> {
        let registry = self.app.registry.clone();
        let transition = registry.lock_room(&self.room_id).await;

        let room = self
            .app
            .store
            .get_active_room(&self.room_id)
            .await?
            .ok_or_else(|| AdmissionError::NotFound(format!("room {}", self.room_id)))?;
        self.max_participants = room.max_participants;
        let capacity = self.max_participants as usize;
        if !registry.has_room_for(&self.room_id, &self.identity.user_id, capacity) {
            return Err(AdmissionError::RoomFull(self.max_participants));
        }

        if let Err(e) = self
            .app
            .store
            .upsert_participant(&self.room_id, &self.identity.user_id, &self.identity.display_name, true)
            .await
        {
            warn!(room_id = %self.room_id, user_id = %self.identity.user_id, %e, "Failed to record participant join");
        }

        let participant = LiveParticipant::new(
            &self.identity.user_id,
            &self.identity.display_name,
            self.connection.clone(),
        );
        let replaced = registry
            .join_bounded(&self.room_id, participant, capacity)
            .map_err(|_| AdmissionError::RoomFull(self.max_participants))?;
        self.state = SessionState::Joined;
        drop(transition);

        if let Some(previous) = replaced {
            info!(
                room_id = %self.room_id,
                user_id = %self.identity.user_id,
                previous_connection = %previous.connection.id(),
                "Replaced existing connection for user"
            );
        }

        let joined = ServerMessage::UserJoined {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            timestamp: Utc::now(),
        };
        broadcast(&self.app.registry, &self.room_id, &joined.frame(), Some(&self.identity.user_id)).await;

        let participants = self
            .app
            .registry
            .members(&self.room_id)
            .into_iter()
            .filter(|p| p.user_id != self.identity.user_id)
            .map(|p| ParticipantInfo {
                user_id: p.user_id,
                display_name: p.display_name,
                joined_at: p.joined_at,
            })
            .collect();
        let welcome = ServerMessage::JoinedRoom {
            room_id: self.room_id.clone(),
            user_id: self.identity.user_id.clone(),
            participants,
        };
        let _ = send_to_connection(self.connection.as_ref(), &welcome).await;

        info!(room_id = %self.room_id, user_id = %self.identity.user_id, connection_id = %self.connection.id(), "Participant joined room");
        Ok(())
    }

    /// Leaves the room if joined. A connection whose registry entry has been
    /// taken over by a newer connection of the same user changes nothing.
    pub async fn leave(&mut self) {
        if self.state != SessionState::Joined {
            return;
        }
        self.state = SessionState::Left;

        let registry = self.app.registry.clone();
        let transition = registry.lock_room(&self.room_id).await;

        let owned = registry
            .lookup(&self.room_id, &self.identity.user_id)
            .is_some_and(|p| p.connection.id() == self.connection.id());
        if !owned {
            debug!(
                room_id = %self.room_id,
                user_id = %self.identity.user_id,
                connection_id = %self.connection.id(),
                "Connection was superseded, leaving room state untouched"
            );
            return;
        }

        if let Err(e) = self
            .app
            .store
            .upsert_participant(&self.room_id, &self.identity.user_id, &self.identity.display_name, false)
            .await
        {
            warn!(room_id = %self.room_id, user_id = %self.identity.user_id, %e, "Failed to record participant leave");
        }

        let now_empty = registry
            .leave_connection(&self.room_id, &self.identity.user_id, self.connection.id())
            .unwrap_or(false);
        if now_empty {
            match self.app.store.deactivate_room(&self.room_id).await {
                Ok(true) => info!(room_id = %self.room_id, "Room deactivated after last participant left"),
                Ok(false) => debug!(room_id = %self.room_id, "Room was already inactive"),
                Err(e) => warn!(room_id = %self.room_id, %e, "Failed to deactivate room"),
            }
        }
        drop(transition);

        let left = ServerMessage::UserLeft {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            timestamp: Utc::now(),
        };
        broadcast(&self.app.registry, &self.room_id, &left.frame(), Some(&self.identity.user_id)).await;
        info!(room_id = %self.room_id, user_id = %self.identity.user_id, "Participant left room");
    }

    pub async fn handle_text(&mut self, text: &str) {
        match decode::<CallRoomMessage>(text) {
            Ok(inbound) => self.dispatch(inbound).await,
            Err(e) => self.protocol_error(e).await,
        }
    }

    pub async fn protocol_error(&self, error: ProtocolError) {
        debug!(room_id = %self.room_id, user_id = %self.identity.user_id, %error, "Protocol error");
        self.reply(&ServerMessage::error(error.to_string())).await;
    }

    async fn dispatch(&mut self, inbound: Inbound<CallRoomMessage>) {
        if self.state != SessionState::Joined {
            return self.dispatch_detached(inbound).await;
        }

        let message = match inbound {
            Inbound::Known(message) => message,
            Inbound::Other { kind, body } => return self.pass_through(&kind, body).await,
        };

        match message {
            CallRoomMessage::Join => self.reply(&ServerMessage::error("already joined this room")).await,
            CallRoomMessage::Leave => self.leave().await,
            CallRoomMessage::Ping => self.reply(&ServerMessage::Pong { timestamp: Utc::now() }).await,
            CallRoomMessage::ChatMessage { message } => {
                let chat = ServerMessage::ChatMessage {
                    user_id: self.identity.user_id.clone(),
                    display_name: self.identity.display_name.clone(),
                    message,
                    timestamp: Utc::now(),
                };
                self.broadcast_others(&chat).await;
            }
            CallRoomMessage::Offer(signal) => self.relay(SignalKind::Offer, signal).await,
            CallRoomMessage::Answer(signal) => self.relay(SignalKind::Answer, signal).await,
            CallRoomMessage::IceCandidate(signal) => self.relay(SignalKind::IceCandidate, signal).await,
            CallRoomMessage::TranscriptionUpdate(update) => self.transcription_update(update).await,
            CallRoomMessage::TranscriptionStatus { enabled, language } => {
                self.transcription_status(enabled, language).await
            }
            CallRoomMessage::AudioChunk(chunk) => self.audio_chunk(chunk).await,
        }
    }

    /// Outside the room only `join` and `ping` do anything.
    async fn dispatch_detached(&mut self, inbound: Inbound<CallRoomMessage>) {
        match inbound {
            Inbound::Known(CallRoomMessage::Join) => self.rejoin().await,
            Inbound::Known(CallRoomMessage::Ping) => {
                self.reply(&ServerMessage::Pong { timestamp: Utc::now() }).await
            }
            _ => {
                self.reply(&ServerMessage::error("not in the room, send `join` first"))
                    .await
            }
        }
    }

    async fn rejoin(&mut self) {
        if let Err(e) = self.join().await {
            if let AdmissionError::Store(dao) = &e {
                warn!(room_id = %self.room_id, %dao, "Failed to look up room for re-join");
            }
            self.reply(&ServerMessage::error(e.to_string())).await;
        }
    }

    async fn relay(&self, kind: SignalKind, signal: SignalMessage) {
        relay(
            &self.app.registry,
            &self.room_id,
            &self.identity.user_id,
            &self.identity.display_name,
            kind,
            signal,
        )
        .await;
    }

    async fn transcription_update(&self, update: TranscriptionUpdate) {
        let confidence = update.confidence.map(normalize_confidence).unwrap_or(100.0);
        if update.is_final {
            persist_final_text(
                self.app.store.as_ref(),
                &self.speaker(),
                None,
                &update.text,
                confidence,
                update.language.as_deref(),
            )
            .await;
        }

        let received = ServerMessage::TranscriptionReceived {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            text: update.text,
            confidence,
            is_final: update.is_final,
            language: update.language,
            timestamp: Utc::now(),
        };
        self.broadcast_others(&received).await;
    }

    async fn transcription_status(&mut self, enabled: bool, language: Option<String>) {
        if let Err(e) = self
            .app
            .store
            .set_transcription_status(&self.room_id, &self.identity.user_id, enabled, language.as_deref())
            .await
        {
            warn!(room_id = %self.room_id, user_id = %self.identity.user_id, %e, "Failed to persist transcription status");
        }
        if language.is_some() {
            self.transcription_language = language.clone();
        }

        let status = ServerMessage::UserTranscriptionStatus {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            enabled,
            language,
        };
        broadcast(&self.app.registry, &self.room_id, &status.frame(), None).await;
    }

    async fn audio_chunk(&self, chunk: AudioChunk) {
        let default_language = self
            .transcription_language
            .as_deref()
            .unwrap_or(self.app.settings.transcription.default_language.as_str());
        let Some(outcome) = process_audio_chunk(
            &self.app,
            self.connection.as_ref(),
            &self.speaker(),
            None,
            default_language,
            chunk,
        )
        .await
        else {
            return;
        };

        let received = ServerMessage::TranscriptionReceived {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            text: outcome.text,
            confidence: outcome.confidence,
            is_final: true,
            language: outcome.language,
            timestamp: Utc::now(),
        };
        self.broadcast_others(&received).await;
    }

    /// Rebroadcasts a message of a kind this endpoint does not interpret,
    /// stamped with the sender's identity.
    async fn pass_through(&self, kind: &str, mut body: Map<String, Value>) {
        debug!(room_id = %self.room_id, user_id = %self.identity.user_id, %kind, "Passing message through");
        body.insert("user_id".to_string(), Value::String(self.identity.user_id.clone()));
        body.insert(
            "display_name".to_string(),
            Value::String(self.identity.display_name.clone()),
        );
        let frame = super::protocol::Frame::from_object(body);
        broadcast(&self.app.registry, &self.room_id, &frame, Some(&self.identity.user_id)).await;
    }

    async fn broadcast_others(&self, message: &ServerMessage) {
        broadcast(&self.app.registry, &self.room_id, &message.frame(), Some(&self.identity.user_id)).await;
    }

    async fn reply(&self, message: &ServerMessage) {
        let _ = send_to_connection(self.connection.as_ref(), message).await;
    }

    fn speaker(&self) -> Speaker<'_> {
        Speaker {
            room_id: &self.room_id,
            user_id: &self.identity.user_id,
            display_name: &self.identity.display_name,
        }
    }
}

/// Client-reported confidence may be a fraction or a percentage.
fn normalize_confidence(value: f64) -> f64 {
    if value <= 1.0 {
        (value * 100.0).max(0.0)
    } else {
        value.min(100.0)
    }
}
