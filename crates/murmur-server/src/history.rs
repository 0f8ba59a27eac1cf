//! History Loader.
//!
//! Joining a chat moves the connection into the chat's room and answers
//! with the chat's recent backlog, oldest first. A failing store degrades
//! to an empty backlog instead of failing the join.

use murmur_shared::constants::HISTORY_LIMIT;
use murmur_shared::{Chat, ChatError, ConnectionId, Message, ServerEvent};
use murmur_store::{MessageFilter, StoreError};
use tracing::{debug, warn};

use crate::config::HistoryFilter;
use crate::hub::Hub;

impl Hub {
    /// Switch the connection's room to `chat` and send it the backlog.
    pub async fn join_chat(
        &self,
        conn: ConnectionId,
        chat: Chat,
    ) -> Result<Vec<Message>, ChatError> {
        let requester = {
            let mut state = self.state.lock().await;
            let requester = state.sender_name(conn)?;
            let outcome = state.rooms.join(conn, chat.clone());
            debug!(
                conn = %conn,
                chat = %chat,
                left = ?outcome.left.as_ref().map(Chat::room_key),
                changed = outcome.changed,
                "Join chat"
            );
            requester
        };

        let messages = self.load_history(&chat, &requester).await;
        self.notify(
            conn,
            ServerEvent::History {
                chat: chat.to_ref(),
                messages: messages.clone(),
            },
        )
        .await;
        Ok(messages)
    }

    /// Most recent messages of `chat` as seen by `requester`, oldest first.
    pub async fn load_history(&self, chat: &Chat, requester: &str) -> Vec<Message> {
        let limit = self.settings.history_limit.clamp(1, HISTORY_LIMIT);

        let filter = match self.history_filter(chat, requester).await {
            Ok(filter) => filter,
            Err(e) => {
                warn!(chat = %chat, error = %e, "Could not resolve history participants");
                return Vec::new();
            }
        };

        match self.store.query(filter, limit).await {
            Ok(mut messages) => {
                messages.truncate(limit);
                messages
            }
            Err(e) => {
                warn!(chat = %chat, error = %e, "History query failed, sending empty backlog");
                Vec::new()
            }
        }
    }

    async fn history_filter(
        &self,
        chat: &Chat,
        requester: &str,
    ) -> Result<MessageFilter, StoreError> {
        let filter = match (self.settings.history_filter, chat) {
            (HistoryFilter::Sender, Chat::Direct { peer }) => {
                let mut senders = vec![requester.to_string()];
                if peer != requester {
                    senders.push(peer.clone());
                }
                MessageFilter::SentBy(senders)
            }
            (HistoryFilter::Sender, Chat::Group { id }) => {
                MessageFilter::SentBy(self.store.group_members(*id).await?)
            }
            (HistoryFilter::Thread, Chat::Direct { peer }) => MessageFilter::DirectThread {
                a: requester.to_string(),
                b: peer.clone(),
            },
            (HistoryFilter::Thread, Chat::Group { id }) => MessageFilter::GroupThread(*id),
        };
        Ok(filter)
    }
}
