use futures::future::join_all;
use tracing::{debug, warn};

use super::connection::ConnectionHandle;
use super::protocol::{Frame, RelayedSignal, ServerMessage, SignalKind, SignalMessage};
use super::registry::RoomRegistry;
use crate::error::SendError;

/// Outcome of one recipient's send during a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub user_id: String,
    pub result: Result<(), SendError>,
}

/// Sends `frame` to every member of the room except `exclude_user`.
///
/// Works on a snapshot taken at call time; every member in it is attempted
/// exactly once, concurrently. Failed recipients stay registered.
pub async fn broadcast(
    registry: &RoomRegistry,
    room_id: &str,
    frame: &Frame,
    exclude_user: Option<&str>,
) -> Vec<Delivery> {
    let recipients: Vec<_> = registry
        .members(room_id)
        .into_iter()
        .filter(|p| exclude_user != Some(p.user_id.as_str()))
        .collect();

    let sends = recipients.into_iter().map(|participant| async move {
        let result = participant.connection.send(frame).await;
        if let Err(ref e) = result {
            warn!(%room_id, user_id = %participant.user_id, %e, "Failed to send WS message");
        }
        Delivery {
            user_id: participant.user_id,
            result,
        }
    });

    let deliveries = join_all(sends).await;
    debug!(%room_id, recipients = deliveries.len(), "Broadcast complete");
    deliveries
}

/// Sends a message back to a single connection, logging a failure.
pub async fn send_to_connection(connection: &dyn ConnectionHandle, message: &ServerMessage) -> Result<(), SendError> {
    let result = connection.send(&message.frame()).await;
    if let Err(ref e) = result {
        warn!(connection_id = %connection.id(), %e, "Failed to send WS message to connection");
    }
    result
}

/// Forwards a peer-negotiation payload to `signal.target_user` in the same
/// room, annotated with the sender.
///
/// Returns `None` when the target is not in the room; the message is then
/// dropped without telling the sender.
pub async fn relay(
    registry: &RoomRegistry,
    room_id: &str,
    from_user: &str,
    from_display_name: &str,
    kind: SignalKind,
    signal: SignalMessage,
) -> Option<Delivery> {
    let Some(target) = registry.lookup(room_id, &signal.target_user) else {
        debug!(%room_id, %from_user, target_user = %signal.target_user, ?kind, "Relay target not in room, dropping");
        return None;
    };

    let message = ServerMessage::signal(
        kind,
        RelayedSignal {
            from_user: from_user.to_string(),
            from_display_name: from_display_name.to_string(),
            target_user: signal.target_user,
            payload: signal.payload,
        },
    );
    let result = target.connection.send(&message.frame()).await;
    if let Err(ref e) = result {
        warn!(%room_id, %from_user, target_user = %target.user_id, %e, "Failed to relay signaling message");
    }
    Some(Delivery {
        user_id: target.user_id,
        result,
    })
}
