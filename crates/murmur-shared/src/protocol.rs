use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::PERSIST_FAILED_CODE;
use crate::error::ChatError;
use crate::message::Message;
use crate::types::ChatRef;

/// Events a client sends over its WebSocket, one JSON text frame each.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a username
    Identify { username: String },

    /// Make a chat the connection's active room and request its backlog
    JoinChat {
        #[serde(flatten)]
        chat: ChatRef,
    },

    /// Send a message to a direct peer or a group
    SendMessage {
        body: String,
        #[serde(flatten)]
        chat: ChatRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_timestamp: Option<DateTime<Utc>>,
    },

    /// Ephemeral typing notification
    Typing {
        #[serde(flatten)]
        chat: ChatRef,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full sorted set of online usernames, sent to every connection
    OnlineUsersChanged { users: Vec<String> },

    /// Backlog for a chat the connection just joined, oldest first
    History {
        #[serde(flatten)]
        chat: ChatRef,
        messages: Vec<Message>,
    },

    /// A live message
    MessageDelivered(Message),

    /// The message was delivered but could not be stored
    PersistWarning {
        message_id: Uuid,
        code: String,
        reason: String,
    },

    /// Someone is typing in a chat this connection can see
    PeerTyping {
        username: String,
        #[serde(flatten)]
        chat: ChatRef,
    },

    /// Another connection identified as the same user and took over
    SessionReplaced { username: String },

    /// The last event from this connection was rejected
    Error { code: String, message: String },
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text).map_err(|e| ChatError::Protocol(e.to_string()))
    }
}

impl ServerEvent {
    pub fn persist_failed(message_id: Uuid, reason: impl Into<String>) -> Self {
        ServerEvent::PersistWarning {
            message_id,
            code: PERSIST_FAILED_CODE.to_string(),
            reason: reason.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ChatError> {
        serde_json::to_string(self).map_err(|e| ChatError::Serialization(e.to_string()))
    }
}

impl From<&ChatError> for ServerEvent {
    fn from(err: &ChatError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
