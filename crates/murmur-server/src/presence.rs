//! Presence Registry.
//!
//! Bidirectional map between live connections and the usernames they
//! identified as. At most one connection per username: the latest
//! `identify` wins and the previous holder loses its entry.

use std::collections::HashMap;

use murmur_shared::ConnectionId;
use tracing::debug;

/// Tracks which user each identified connection belongs to.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    by_conn: HashMap<ConnectionId, String>,
    by_name: HashMap<String, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn` to `username` in both directions.
    ///
    /// Returns the connection that previously held `username`, which no
    /// longer has a presence entry afterwards.
    pub fn identify(&mut self, conn: ConnectionId, username: &str) -> Option<ConnectionId> {
        // Re-identifying under a new name releases the old one.
        if let Some(old_name) = self.by_conn.remove(&conn) {
            if self.by_name.get(&old_name) == Some(&conn) {
                self.by_name.remove(&old_name);
            }
        }

        let evicted = self
            .by_name
            .insert(username.to_string(), conn)
            .filter(|prev| *prev != conn);

        if let Some(prev) = evicted {
            self.by_conn.remove(&prev);
            debug!(username, evicted = %prev, by = %conn, "Presence entry replaced");
        }

        self.by_conn.insert(conn, username.to_string());
        evicted
    }

    /// Drop the entry for `conn`, if any. Returns the username it held.
    pub fn forget(&mut self, conn: ConnectionId) -> Option<String> {
        let username = self.by_conn.remove(&conn)?;
        if self.by_name.get(&username) == Some(&conn) {
            self.by_name.remove(&username);
        }
        Some(username)
    }

    /// Current connection of an online user.
    pub fn lookup(&self, username: &str) -> Option<ConnectionId> {
        self.by_name.get(username).copied()
    }

    /// Username bound to a connection.
    pub fn username(&self, conn: ConnectionId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    /// Online usernames, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn online_count(&self) -> usize {
        self.by_name.len()
    }
}
