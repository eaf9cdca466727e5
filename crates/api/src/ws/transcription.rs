use std::sync::Arc;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket, close_code},
    },
    http::HeaderMap,
    response::Response,
};
use bson::DateTime as BsonDateTime;
use callroom_db::models::{TranscriptionChunk, TranscriptionSession, transcription::word_count};
use callroom_services::{CallStore, Identity};
use callroom_transcription::{ChainOutcome, decode_chunk};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{ConnectionHandle, WsConnection};
use super::dispatcher::send_to_connection;
use super::protocol::{AudioChunk, Inbound, ServerMessage, TranscriptionMessage, decode};
use crate::error::{AdmissionError, ProtocolError};
use crate::state::AppState;

/// Who a piece of transcript is attributed to.
#[derive(Debug, Clone, Copy)]
pub struct Speaker<'a> {
    pub room_id: &'a str,
    pub user_id: &'a str,
    pub display_name: &'a str,
}

/// Stores finalized text against the room's active transcription session
/// and bumps its word count.
///
/// With `required_session` set, text is only stored if that session is the
/// room's active one. Best-effort: failures are logged and swallowed.
/// Returns the session id the text was stored under.
pub async fn persist_final_text(
    store: &dyn CallStore,
    speaker: &Speaker<'_>,
    required_session: Option<&str>,
    text: &str,
    confidence: f64,
    language: Option<&str>,
) -> Option<String> {
    let session = match store.get_active_session(speaker.room_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(room_id = %speaker.room_id, "No active transcription session, not persisting");
            return None;
        }
        Err(e) => {
            warn!(room_id = %speaker.room_id, %e, "Failed to look up active transcription session");
            return None;
        }
    };
    if let Some(required) = required_session
        && required != session.session_id
    {
        debug!(
            room_id = %speaker.room_id,
            session_id = %required,
            active_session_id = %session.session_id,
            "Session is no longer the room's active one, not persisting"
        );
        return None;
    }

    let words = word_count(text);
    let chunk = TranscriptionChunk {
        id: None,
        session_id: session.session_id.clone(),
        room_id: speaker.room_id.to_string(),
        participant_id: speaker.user_id.to_string(),
        speaker_name: speaker.display_name.to_string(),
        text: text.to_string(),
        confidence,
        is_final: true,
        language: language.map(str::to_string),
        word_count: words,
        timestamp: BsonDateTime::now(),
    };

    if let Err(e) = store.append_transcription_chunk(chunk).await {
        warn!(session_id = %session.session_id, user_id = %speaker.user_id, %e, "Failed to persist transcription chunk");
        return None;
    }
    if let Err(e) = store.bump_session_word_count(&session.session_id, words).await {
        warn!(session_id = %session.session_id, %e, "Failed to update session word count");
    }
    Some(session.session_id)
}

/// Acknowledges an audio chunk, runs it through the engine chain and sends
/// the resulting `transcription` back on `connection`.
///
/// Decode failures and an exhausted chain end processing of this chunk only;
/// the client has already been sent `chunk_received`.
pub async fn process_audio_chunk(
    state: &AppState,
    connection: &dyn ConnectionHandle,
    speaker: &Speaker<'_>,
    required_session: Option<&str>,
    default_language: &str,
    chunk: AudioChunk,
) -> Option<ChainOutcome> {
    let _ = send_to_connection(connection, &ServerMessage::ChunkReceived { timestamp: Utc::now() }).await;

    let audio = match decode_chunk(&chunk.audio_data, chunk.format, chunk.sample_rate) {
        Ok(audio) => audio,
        Err(e) => {
            warn!(user_id = %speaker.user_id, format = ?chunk.format, %e, "Failed to decode audio chunk");
            return None;
        }
    };

    let hint = chunk.language.as_deref().unwrap_or(default_language);
    let Some(outcome) = state.engines.transcribe(&audio, Some(hint)).await else {
        debug!(user_id = %speaker.user_id, "No engine produced text for chunk");
        return None;
    };

    let language = outcome.language.clone().unwrap_or_else(|| hint.to_string());
    persist_final_text(
        state.store.as_ref(),
        speaker,
        required_session,
        &outcome.text,
        outcome.confidence,
        Some(&language),
    )
    .await;

    let message = ServerMessage::Transcription {
        text: outcome.text.clone(),
        confidence: outcome.confidence,
        is_final: true,
        engine: outcome.engine.clone(),
        language: Some(language),
        speaker_name: speaker.display_name.to_string(),
        timestamp: Utc::now(),
    };
    let _ = send_to_connection(connection, &message).await;

    Some(outcome)
}

// ---- /ws/transcription ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TranscriptionParams {
    pub session_id: Option<String>,
    pub language: Option<String>,
    pub token: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<TranscriptionParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = super::credential(params.token.clone(), &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, params, token))
}

struct Admitted {
    identity: Identity,
    session: TranscriptionSession,
    language: String,
}

async fn admit(
    state: &AppState,
    params: &TranscriptionParams,
    token: Option<&str>,
) -> Result<Admitted, AdmissionError> {
    let identity = super::authenticate(state, token)?;

    let session_id = params
        .session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdmissionError::NotFound("transcription session".to_string()))?;
    let session = state
        .store
        .get_session(session_id)
        .await?
        .filter(|s| s.active)
        .ok_or_else(|| AdmissionError::NotFound(format!("transcription session {session_id}")))?;
    let room = state
        .store
        .get_active_room(&session.room_id)
        .await?
        .ok_or_else(|| AdmissionError::NotFound(format!("room {}", session.room_id)))?;

    let authorized = room.creator_id == identity.user_id
        || state.registry.contains(&room.room_id, &identity.user_id)
        || state
            .store
            .is_participant_in_call(&room.room_id, &identity.user_id)
            .await?;
    if !authorized {
        return Err(AdmissionError::Forbidden);
    }

    let language = params
        .language
        .clone()
        .filter(|l| !l.is_empty())
        .or_else(|| Some(session.language.clone()).filter(|l| !l.is_empty()))
        .unwrap_or_else(|| state.settings.transcription.default_language.clone());

    Ok(Admitted {
        identity,
        session,
        language,
    })
}

enum Flow {
    Continue,
    Stop,
}

async fn handle_socket(socket: WebSocket, state: AppState, params: TranscriptionParams, token: Option<String>) {
    let connection_id = Uuid::new_v4().to_string();
    let (sender, mut receiver) = socket.split();
    let connection = Arc::new(WsConnection::new(connection_id.clone(), sender, state.send_timeout()));

    let admitted = match admit(&state, &params, token.as_deref()).await {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!(%connection_id, session_id = ?params.session_id, %e, "Transcription connection rejected");
            connection.close(e.close_code(), &e.to_string()).await;
            return;
        }
    };

    let session_id = admitted.session.session_id.clone();
    let user_id = admitted.identity.user_id.clone();
    info!(%connection_id, %session_id, %user_id, language = %admitted.language, "Transcription connection opened");

    let started = ServerMessage::SessionStarted {
        session_id: session_id.clone(),
        room_id: admitted.session.room_id.clone(),
        language: admitted.language.clone(),
    };
    let _ = send_to_connection(connection.as_ref(), &started).await;

    let idle_timeout = state.idle_timeout();
    loop {
        let next = match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Ok(next) => next,
            Err(_) => {
                debug!(%connection_id, %session_id, "Idle, re-polling");
                continue;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if let Flow::Stop = handle_message(&state, connection.as_ref(), &admitted, text.as_str()).await {
                    break;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                let error = ProtocolError::BinaryFrame;
                let _ = send_to_connection(connection.as_ref(), &ServerMessage::error(error.to_string())).await;
            }
            Some(Ok(Message::Ping(data))) => connection.pong(data).await,
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                warn!(%connection_id, %session_id, %e, "WebSocket error");
                break;
            }
        }
    }

    info!(%connection_id, %session_id, %user_id, "Transcription connection closed");
}

async fn handle_message(state: &AppState, connection: &dyn ConnectionHandle, admitted: &Admitted, text: &str) -> Flow {
    let message = match decode::<TranscriptionMessage>(text) {
        Ok(Inbound::Known(message)) => message,
        Ok(Inbound::Other { kind, .. }) => {
            debug!(session_id = %admitted.session.session_id, %kind, "Unknown transcription message");
            let reply = ServerMessage::UnknownMessage { received_type: kind };
            let _ = send_to_connection(connection, &reply).await;
            return Flow::Continue;
        }
        Err(e) => {
            let _ = send_to_connection(connection, &ServerMessage::error(e.to_string())).await;
            return Flow::Continue;
        }
    };

    match message {
        TranscriptionMessage::StartRecording => {
            let _ = send_to_connection(connection, &ServerMessage::RecordingStarted { timestamp: Utc::now() }).await;
        }
        TranscriptionMessage::AudioChunk(chunk) => {
            let speaker = Speaker {
                room_id: &admitted.session.room_id,
                user_id: &admitted.identity.user_id,
                display_name: &admitted.identity.display_name,
            };
            process_audio_chunk(
                state,
                connection,
                &speaker,
                Some(&admitted.session.session_id),
                &admitted.language,
                chunk,
            )
            .await;
        }
        TranscriptionMessage::StopRecording => {
            let _ = send_to_connection(connection, &ServerMessage::RecordingStopped { timestamp: Utc::now() }).await;
            connection.close(close_code::NORMAL, "recording stopped").await;
            return Flow::Stop;
        }
        TranscriptionMessage::Ping => {
            let _ = send_to_connection(connection, &ServerMessage::Pong { timestamp: Utc::now() }).await;
        }
    }
    Flow::Continue
}
