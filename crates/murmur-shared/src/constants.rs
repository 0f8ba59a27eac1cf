/// Application name
pub const APP_NAME: &str = "Murmur";

/// Upper bound on the number of messages returned by a history load
pub const HISTORY_LIMIT: usize = 50;

/// Maximum message body length in bytes (after trimming)
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Maximum username length in bytes
pub const MAX_USERNAME_LEN: usize = 64;

/// Separator between chat type and chat id in a room key
pub const ROOM_KEY_SEPARATOR: char = ':';

/// Code carried by `persist-warning` events
pub const PERSIST_FAILED_CODE: &str = "message-delivery-persist-failed";

/// Default HTTP / WebSocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Outbound event queue depth per connection
pub const DEFAULT_OUTBOUND_QUEUE_DEPTH: usize = 256;
