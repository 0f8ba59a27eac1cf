//! Typing Relay.
//!
//! Best-effort, ephemeral: nothing is stored, nothing is acknowledged and
//! the sender never hears back, not even on error.

use murmur_shared::{Chat, ConnectionId, ServerEvent};
use tracing::trace;

use crate::hub::Hub;

impl Hub {
    /// Tell the chat's audience, minus the typist, that `conn` is typing.
    /// Returns the number of connections notified.
    pub async fn relay_typing(&self, conn: ConnectionId, chat: &Chat) -> usize {
        let state = self.state.lock().await;
        let Ok(username) = state.sender_name(conn) else {
            trace!(conn = %conn, "Ignoring typing from unidentified connection");
            return 0;
        };

        let targets = state
            .chat_audience(chat)
            .into_iter()
            .filter(|target| *target != conn);

        let event = ServerEvent::PeerTyping {
            username,
            chat: chat.to_ref(),
        };
        state.emit_many(targets, &event)
    }
}
