//! Room Manager.
//!
//! Explicit `room key -> connections` map. A connection sits in at most one
//! chat room at a time; joining another chat moves it. Each connection's
//! private channel (its own outbound queue in the hub) is not a room here
//! and is never affected by a join.

use std::collections::{HashMap, HashSet};

use murmur_shared::{Chat, ConnectionId};
use tracing::debug;

/// Result of a [`RoomManager::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Room the connection was moved out of.
    pub left: Option<Chat>,
    /// `false` when the connection was already in the requested room.
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RoomManager {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    current: HashMap<ConnectionId, Chat>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `chat` the connection's only room.
    pub fn join(&mut self, conn: ConnectionId, chat: Chat) -> JoinOutcome {
        if self.current_room(conn) == Some(&chat) {
            return JoinOutcome {
                left: None,
                changed: false,
            };
        }

        let left = self.leave(conn);
        let key = chat.room_key();

        let members = self.rooms.entry(key.clone()).or_default();
        members.insert(conn);

        debug!(conn = %conn, room = %key, members = members.len(), "Joined room");

        self.current.insert(conn, chat);
        JoinOutcome {
            left,
            changed: true,
        }
    }

    /// Remove the connection from its room. Empty rooms are dropped.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<Chat> {
        let chat = self.current.remove(&conn)?;
        let key = chat.room_key();

        let now_empty = match self.rooms.get_mut(&key) {
            Some(members) => {
                members.remove(&conn);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove(&key);
        }

        debug!(conn = %conn, room = %key, "Left room");
        Some(chat)
    }

    /// The chat whose room the connection is in.
    pub fn current_room(&self, conn: ConnectionId) -> Option<&Chat> {
        self.current.get(&conn)
    }

    /// Connections currently joined to `chat`'s room.
    pub fn members(&self, chat: &Chat) -> Vec<ConnectionId> {
        self.rooms
            .get(&chat.room_key())
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
