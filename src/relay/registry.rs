use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::connection::ConnectionSink;
use super::room::{JoinOutcome, LeaveOutcome, RelayOutcome, Role, Room, RoomSummary};
use super::signaling::MessageKind;

pub type SharedRoom = Arc<Mutex<Room>>;

/// Room operations never panic while holding the lock, but a poisoned room
/// is still structurally valid, so keep serving it.
fn lock_room(room: &SharedRoom) -> MutexGuard<'_, Room> {
    room.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-wide table of live rooms.
///
/// Rooms are created on first join and pruned as soon as they become empty.
/// Each room has its own lock, so unrelated rooms never contend.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get_or_create(&self, key: &str) -> SharedRoom {
        self.rooms
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::info!(room = %key, "Creating room");
                Arc::new(Mutex::new(Room::new(key)))
            })
            .clone()
    }

    /// Deletes the entry only if the room is empty. Returns whether it was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.rooms
            .remove_if(key, |_, room| {
                let mut room = lock_room(room);
                if room.is_empty() {
                    room.retire();
                    tracing::info!(room = %room.key(), "Room empty, removed");
                    true
                } else {
                    false
                }
            })
            .is_some()
    }

    /// Registers `sink` under `role` and returns the guard that owns the membership.
    pub fn join(
        &self,
        key: &str,
        role: Role,
        sink: Arc<dyn ConnectionSink>,
        name: Option<String>,
    ) -> (Membership, JoinOutcome) {
        loop {
            let room = self.get_or_create(key);
            let mut guard = lock_room(&room);

            // Lost a race with `remove`; the next lookup creates a fresh room.
            if guard.is_retired() {
                continue;
            }

            let outcome = guard.join(role, sink.clone(), name.clone());
            drop(guard);

            let membership = Membership {
                registry: self.clone(),
                room,
                key: key.to_string(),
                role,
                sink,
            };
            return (membership, outcome);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rooms.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn describe(&self, key: &str) -> Option<RoomSummary> {
        let room = self.rooms.get(key)?.clone();
        let summary = lock_room(&room).summary();
        Some(summary)
    }
}

/// One connection's seat in a room.
///
/// Dropping the membership vacates the role, prunes the room if it is now
/// empty and closes the sink, exactly once.
pub struct Membership {
    registry: RoomRegistry,
    room: SharedRoom,
    key: String,
    role: Role,
    sink: Arc<dyn ConnectionSink>,
}

impl Membership {
    pub fn room_key(&self) -> &str {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn sink(&self) -> &Arc<dyn ConnectionSink> {
        &self.sink
    }

    pub fn relay(&self, kind: MessageKind, payload: &str) -> RelayOutcome {
        lock_room(&self.room).relay(self.role, kind, payload)
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        let outcome = lock_room(&self.room).leave(self.role, self.sink.id());
        if let LeaveOutcome::Left { now_empty } = outcome {
            tracing::debug!(room = %self.key, role = %self.role, now_empty, "Membership released");
        }

        // No-op unless the room is now empty.
        self.registry.remove(&self.key);

        self.sink.close();
    }
}
