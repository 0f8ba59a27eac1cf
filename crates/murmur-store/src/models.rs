//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the REST
//! layer. Messages use the shared [`Message`] record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use murmur_shared::GroupId;

pub use murmur_shared::Message;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. Owned by the account directory; the delivery core
/// only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    /// Unique login name.
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A multi-party chat with explicit membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Username of the member who created the group.
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

/// One row of the user <-> group relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub username: String,
    pub is_creator: bool,
    pub joined_at: DateTime<Utc>,
}
