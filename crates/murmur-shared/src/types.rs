use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_USERNAME_LEN, ROOM_KEY_SEPARATOR};
use crate::error::ChatError;

/// Opaque handle for one live client session. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable group chat identifier (the store's row id).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(GroupId)
            .map_err(|_| ChatError::InvalidChat(format!("group id must be numeric, got {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ChatType::Direct),
            "group" => Ok(ChatType::Group),
            other => Err(ChatError::InvalidChat(format!("unknown chat type {other:?}"))),
        }
    }
}

/// A chat as the server routes it: a direct chat with one peer, or a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Chat {
    Direct { peer: String },
    Group { id: GroupId },
}

impl Chat {
    pub fn direct(peer: impl Into<String>) -> Self {
        Chat::Direct { peer: peer.into() }
    }

    pub fn group(id: i64) -> Self {
        Chat::Group { id: GroupId(id) }
    }

    pub fn chat_type(&self) -> ChatType {
        match self {
            Chat::Direct { .. } => ChatType::Direct,
            Chat::Group { .. } => ChatType::Group,
        }
    }

    /// The chat id in its wire form.
    pub fn chat_id(&self) -> String {
        match self {
            Chat::Direct { peer } => peer.clone(),
            Chat::Group { id } => id.to_string(),
        }
    }

    /// Broadcast room key, `type:id`.
    pub fn room_key(&self) -> String {
        format!("{}{}{}", self.chat_type(), ROOM_KEY_SEPARATOR, self.chat_id())
    }

    pub fn to_ref(&self) -> ChatRef {
        ChatRef {
            chat_type: self.chat_type(),
            chat_id: self.chat_id(),
        }
    }
}

impl fmt::Display for Chat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.room_key())
    }
}

/// Wire form of a chat address: `{ "chatType": "...", "chatId": "..." }`.
///
/// Group ids may arrive as JSON numbers or strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub chat_type: ChatType,
    #[serde(deserialize_with = "string_or_number")]
    pub chat_id: String,
}

impl TryFrom<ChatRef> for Chat {
    type Error = ChatError;

    fn try_from(value: ChatRef) -> Result<Self, Self::Error> {
        match value.chat_type {
            ChatType::Direct => {
                let peer = validate_username(&value.chat_id)
                    .map_err(|_| ChatError::InvalidChat(format!("bad peer {:?}", value.chat_id)))?;
                Ok(Chat::Direct { peer })
            }
            ChatType::Group => Ok(Chat::Group {
                id: value.chat_id.parse()?,
            }),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Validate a username and return it trimmed.
pub fn validate_username(raw: &str) -> Result<String, ChatError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ChatError::InvalidUsername("empty".into()));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(ChatError::InvalidUsername(format!(
            "longer than {MAX_USERNAME_LEN} bytes"
        )));
    }
    if name.chars().any(|c| c.is_control() || c == ROOM_KEY_SEPARATOR) {
        return Err(ChatError::InvalidUsername(format!(
            "{name:?} contains a forbidden character"
        )));
    }
    Ok(name.to_string())
}
