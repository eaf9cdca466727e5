use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::connection::ConnectionHandle;

/// A user currently connected to a room. In-memory only.
#[derive(Clone)]
pub struct LiveParticipant {
    pub user_id: String,
    pub display_name: String,
    pub connection: Arc<dyn ConnectionHandle>,
    pub joined_at: DateTime<Utc>,
}

impl LiveParticipant {
    pub fn new(user_id: &str, display_name: &str, connection: Arc<dyn ConnectionHandle>) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            connection,
            joined_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for LiveParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveParticipant")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("connection_id", &self.connection.id())
            .field("joined_at", &self.joined_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("room is full ({capacity} participants)")]
pub struct RoomFull {
    pub capacity: usize,
}

/// Process-wide map of room id to its live participants, one entry per
/// `(room_id, user_id)`.
///
/// Each room's member set is mutated under its DashMap shard lock, so two
/// writes to the same room never interleave while different rooms proceed
/// independently. Readers get snapshots. A room's entry is removed as soon
/// as it empties.
///
/// Membership changes that must stay consistent with the durable room
/// record (join after the active check, last leave and deactivation) run
/// under [`lock_room`](Self::lock_room).
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, HashMap<String, LiveParticipant>>,
    transitions: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive hold on one room's membership transitions. The room's lock
/// entry is dropped with the last holder.
pub struct RoomTransition<'a> {
    registry: &'a RoomRegistry,
    room_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RoomTransition<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.registry
            .transitions
            .remove_if(&self.room_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other join or leave transition of `room_id` is in
    /// progress. Rooms never contend with each other.
    pub async fn lock_room(&self, room_id: &str) -> RoomTransition<'_> {
        let lock = self.transitions.entry(room_id.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        RoomTransition {
            registry: self,
            room_id: room_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Whether `user_id` could join without exceeding `capacity`. A user
    /// already present always can.
    pub fn has_room_for(&self, room_id: &str, user_id: &str, capacity: usize) -> bool {
        self.rooms
            .get(room_id)
            .is_none_or(|members| members.contains_key(user_id) || members.len() < capacity)
    }

    /// Adds or replaces the user's entry. A replaced connection is returned
    /// to the caller and is not closed; its own disconnect cleans it up.
    pub fn join(&self, room_id: &str, participant: LiveParticipant) -> Option<LiveParticipant> {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(participant.user_id.clone(), participant)
    }

    /// Like [`join`](Self::join) but refuses a user who is not already
    /// present once the room holds `capacity` users.
    pub fn join_bounded(
        &self,
        room_id: &str,
        participant: LiveParticipant,
        capacity: usize,
    ) -> Result<Option<LiveParticipant>, RoomFull> {
        let mut members = self.rooms.entry(room_id.to_string()).or_default();
        if !members.contains_key(&participant.user_id) && members.len() >= capacity {
            let empty = members.is_empty();
            drop(members);
            if empty {
                self.rooms.remove_if(room_id, |_, m| m.is_empty());
            }
            return Err(RoomFull { capacity });
        }
        Ok(members.insert(participant.user_id.clone(), participant))
    }

    /// Removes the user's entry. Returns whether the room is now empty.
    pub fn leave(&self, room_id: &str, user_id: &str) -> bool {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut room) => {
                room.get_mut().remove(user_id);
                if room.get().is_empty() {
                    room.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => true,
        }
    }

    /// Removes the user's entry only if it still belongs to `connection_id`.
    ///
    /// Returns `None` when the entry was already replaced by a newer
    /// connection (or is gone), otherwise whether the room is now empty.
    pub fn leave_connection(&self, room_id: &str, user_id: &str, connection_id: &str) -> Option<bool> {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut room) => {
                let owned = room
                    .get()
                    .get(user_id)
                    .is_some_and(|p| p.connection.id() == connection_id);
                if !owned {
                    return None;
                }
                room.get_mut().remove(user_id);
                if room.get().is_empty() {
                    room.remove();
                    Some(true)
                } else {
                    Some(false)
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn lookup(&self, room_id: &str, user_id: &str) -> Option<LiveParticipant> {
        self.rooms
            .get(room_id)
            .and_then(|members| members.get(user_id).cloned())
    }

    /// Snapshot of the room's members at call time.
    pub fn members(&self, room_id: &str) -> Vec<LiveParticipant> {
        self.rooms
            .get(room_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|members| members.contains_key(user_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|r| r.value().len()).sum()
    }
}
