//! # murmur-shared
//!
//! Types shared by the Murmur store and server: chat addressing, the message
//! record, the WebSocket event protocol and the common error taxonomy.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::ChatError;
pub use message::Message;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::{Chat, ChatRef, ChatType, ConnectionId, GroupId};
