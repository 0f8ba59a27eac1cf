use thiserror::Error;

/// Errors raised while handling a client event.
///
/// None of these are fatal: the dispatch loop reports them to the offending
/// connection and carries on. An offline direct-message target is a normal
/// state and has no variant here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Connection has not identified")]
    Unauthenticated,

    #[error("Invalid chat: {0}")]
    InvalidChat(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Message body is empty")]
    EmptyBody,

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Too many events, slow down")]
    RateLimited,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChatError {
    /// Stable machine-readable code sent to clients in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Unauthenticated => "unauthenticated",
            ChatError::InvalidChat(_) => "invalid-chat",
            ChatError::InvalidUsername(_) => "invalid-username",
            ChatError::EmptyBody => "empty-body",
            ChatError::MessageTooLarge { .. } => "message-too-large",
            ChatError::RateLimited => "rate-limited",
            ChatError::Protocol(_) => "bad-request",
            ChatError::Serialization(_) => "internal",
        }
    }
}
