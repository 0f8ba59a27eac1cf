use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;
use crate::types::{Chat, ChatType};

/// An immutable chat message.
///
/// Created by the router when a `send-message` event is accepted, delivered
/// live and then appended to the durable store. Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// Username of the author.
    pub sender: String,
    /// The peer for direct chats, `None` for groups.
    pub recipient: Option<String>,
    pub body: String,
    pub chat_type: ChatType,
    /// Chat id as addressed by the sender (peer username or group id).
    pub chat_id: String,
    /// Server clock at creation time; history is ordered by this.
    pub timestamp: DateTime<Utc>,
    /// Clock reported by the sending client, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        sender: impl Into<String>,
        chat: &Chat,
        body: impl Into<String>,
        client_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let recipient = match chat {
            Chat::Direct { peer } => Some(peer.clone()),
            Chat::Group { .. } => None,
        };

        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            recipient,
            body: body.into(),
            chat_type: chat.chat_type(),
            chat_id: chat.chat_id(),
            timestamp: Utc::now(),
            client_timestamp,
        }
    }
}

/// Trim a message body and check it is non-empty and within `max_len` bytes.
pub fn validate_body(raw: &str, max_len: usize) -> Result<String, ChatError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ChatError::EmptyBody);
    }
    if body.len() > max_len {
        return Err(ChatError::MessageTooLarge {
            size: body.len(),
            max: max_len,
        });
    }
    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_message_has_recipient() {
        let msg = Message::new("alice", &Chat::direct("bob"), "hi", None);
        assert_eq!(msg.recipient.as_deref(), Some("bob"));
        assert_eq!(msg.chat_type, ChatType::Direct);
        assert_eq!(msg.chat_id, "bob");
    }

    #[test]
    fn test_group_message_has_no_recipient() {
        let msg = Message::new("alice", &Chat::group(3), "hello all", None);
        assert!(msg.recipient.is_none());
        assert_eq!(msg.chat_id, "3");
    }

    #[test]
    fn test_validate_body() {
        assert_eq!(validate_body("  hi \n", 10).unwrap(), "hi");
        assert_eq!(validate_body("   ", 10), Err(ChatError::EmptyBody));
        assert_eq!(
            validate_body("0123456789ab", 10),
            Err(ChatError::MessageTooLarge { size: 12, max: 10 })
        );
    }
}
