use dashmap::DashMap;
use push_common::RoomSet;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Handle to a connected client held in room member lists.
#[derive(Clone, Debug)]
pub struct ConnHandle {
    /// Channel sender delivering encoded frames to the connection's task.
    pub tx: mpsc::Sender<String>,
}

/// Concurrent room-name → members registry.
///
/// Rooms come into existence when the first member joins and vanish when
/// the last member leaves; emitting to an unknown room is a no-op.
#[derive(Debug, Default)]
pub struct Rooms {
    rooms: DashMap<String, HashMap<u64, ConnHandle>>,
}

impl Rooms {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room.
    pub fn join(&self, room: &str, conn_id: u64, handle: ConnHandle) {
        self.rooms
            .entry(room.to_owned())
            .or_default()
            .insert(conn_id, handle);
    }

    /// Removes a connection from every room in `rooms`, dropping rooms
    /// that become empty.
    pub fn leave(&self, rooms: &RoomSet, conn_id: u64) {
        for room in rooms {
            let mut empty = false;
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&conn_id);
                empty = members.is_empty();
            }
            if empty {
                self.rooms.remove_if(room, |_, members| members.is_empty());
            }
        }
    }

    /// Sends an encoded frame to every member of `room`, best effort.
    ///
    /// Delivery is at-most-once: members whose queue is full or closed are
    /// skipped, so a slow client never blocks the caller. Returns the
    /// number of queued deliveries.
    pub fn emit(&self, room: &str, frame: &str) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };
        let mut delivered = 0;
        for handle in members.values() {
            if handle.tx.try_send(frame.to_owned()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of members currently in a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no room has any member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
