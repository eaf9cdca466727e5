use std::sync::Arc;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use callroom_db::models::Room;
use callroom_services::Identity;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::connection::{ConnectionHandle, WsConnection};
use super::session::CallSession;
use crate::error::{AdmissionError, ProtocolError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomParams {
    pub room_id: Option<String>,
    pub token: Option<String>,
}

/// `GET /ws/room`. Admission runs after the upgrade so a refusal reaches the
/// client as a close code rather than an HTTP status.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<RoomParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = super::credential(params.token.clone(), &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.room_id, token))
}

async fn admit(
    state: &AppState,
    room_id: Option<&str>,
    token: Option<&str>,
) -> Result<(Identity, Room), AdmissionError> {
    let identity = super::authenticate(state, token)?;
    let room_id = room_id
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AdmissionError::NotFound("room".to_string()))?;
    let room = state
        .store
        .get_active_room(room_id)
        .await?
        .ok_or_else(|| AdmissionError::NotFound(format!("room {room_id}")))?;
    Ok((identity, room))
}

async fn handle_socket(socket: WebSocket, state: AppState, room_id: Option<String>, token: Option<String>) {
    let connection_id = Uuid::new_v4().to_string();
    let (sender, mut receiver) = socket.split();
    let connection = Arc::new(WsConnection::new(connection_id.clone(), sender, state.send_timeout()));

    let (identity, room) = match admit(&state, room_id.as_deref(), token.as_deref()).await {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!(%connection_id, ?room_id, %e, "Call-room connection rejected");
            connection.close(e.close_code(), &e.to_string()).await;
            return;
        }
    };
    let user_id = identity.user_id.clone();
    info!(%connection_id, room_id = %room.room_id, %user_id, "WebSocket connected");

    let mut session = CallSession::new(state.clone(), &room, identity, connection.clone());
    if let Err(e) = session.join().await {
        warn!(%connection_id, room_id = %room.room_id, %user_id, %e, "Call-room join refused");
        connection.close(e.close_code(), &e.to_string()).await;
        return;
    }

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
            Ok(Message::Binary(_)) => session.protocol_error(ProtocolError::BinaryFrame).await,
            Ok(Message::Ping(data)) => connection.pong(data).await,
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(%connection_id, room_id = %room.room_id, %user_id, %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup
    session.leave().await;
    info!(connection_id = %connection.id(), room_id = %session.room_id(), %user_id, "WebSocket disconnected");
}
