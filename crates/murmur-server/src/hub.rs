//! Connection hub.
//!
//! Owns the presence registry, the room manager and every connection's
//! outbound queue behind a single lock, so a presence change, a room move
//! and the fan-out that depends on them are observed atomically by other
//! events. Store and directory I/O never runs while the lock is held.
//!
//! The operations are split across files the way the store crate splits
//! `impl Database`: message routing in `router.rs`, history in `history.rs`
//! and typing relay in `typing.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use murmur_shared::constants::{DEFAULT_OUTBOUND_QUEUE_DEPTH, HISTORY_LIMIT, MAX_MESSAGE_LEN};
use murmur_shared::types::validate_username;
use murmur_shared::{Chat, ChatError, ClientEvent, ConnectionId, ServerEvent};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace};

use crate::config::{HistoryFilter, ServerConfig};
use crate::directory::{AccountDirectory, SessionClaim};
use crate::presence::PresenceRegistry;
use crate::rooms::RoomManager;
use crate::store::MessageStore;

/// Tunables the hub needs from [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub history_limit: usize,
    pub history_filter: HistoryFilter,
    pub max_message_len: usize,
    pub outbound_queue_depth: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            history_limit: HISTORY_LIMIT,
            history_filter: HistoryFilter::Sender,
            max_message_len: MAX_MESSAGE_LEN,
            outbound_queue_depth: DEFAULT_OUTBOUND_QUEUE_DEPTH,
        }
    }
}

impl From<&ServerConfig> for HubSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            history_filter: config.history_filter,
            max_message_len: config.max_message_len,
            outbound_queue_depth: config.outbound_queue_depth,
        }
    }
}

pub(crate) struct HubState {
    pub(crate) presence: PresenceRegistry,
    pub(crate) rooms: RoomManager,
    outbound: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
}

impl HubState {
    fn new() -> Self {
        Self {
            presence: PresenceRegistry::new(),
            rooms: RoomManager::new(),
            outbound: HashMap::new(),
        }
    }

    /// Queue an event on one connection. Full or closed queues drop it.
    pub(crate) fn emit(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        let Some(tx) = self.outbound.get(&conn) else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(conn = %conn, error = %e, "Dropping event for slow connection");
                false
            }
        }
    }

    /// Queue the same event on several connections. Returns how many took it.
    pub(crate) fn emit_many<I>(&self, conns: I, event: &ServerEvent) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        conns
            .into_iter()
            .filter(|conn| self.emit(*conn, event.clone()))
            .count()
    }

    /// The identified username of `conn`.
    pub(crate) fn sender_name(&self, conn: ConnectionId) -> Result<String, ChatError> {
        self.presence
            .username(conn)
            .map(str::to_string)
            .ok_or(ChatError::Unauthenticated)
    }

    fn broadcast_online_users(&self) {
        let event = ServerEvent::OnlineUsersChanged {
            users: self.presence.snapshot(),
        };
        self.emit_many(self.outbound.keys().copied(), &event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HubStats {
    pub online: usize,
    pub connections: usize,
    pub rooms: usize,
}

/// Shared handle to the delivery core. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    pub(crate) state: Arc<Mutex<HubState>>,
    pub(crate) store: Arc<dyn MessageStore>,
    directory: Arc<dyn AccountDirectory>,
    pub(crate) settings: HubSettings,
}

impl Hub {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn AccountDirectory>,
        settings: HubSettings,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::new())),
            store,
            directory,
            settings,
        }
    }

    /// Register a new transport connection. The receiver is its private
    /// channel: every event addressed to this connection arrives there.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.settings.outbound_queue_depth.max(1));
        self.state.lock().await.outbound.insert(conn, tx);
        debug!(conn = %conn, "Connection registered");
        (conn, rx)
    }

    /// Bind the connection to a username and broadcast the new online set.
    ///
    /// A previous connection of the same user is evicted: it loses its
    /// presence entry and room, and is told it was replaced.
    pub async fn identify(&self, conn: ConnectionId, username: &str) -> Result<String, ChatError> {
        let candidate = validate_username(username)?;
        let claim = SessionClaim {
            connection: conn,
            username: candidate,
        };
        let username = self
            .directory
            .resolve_session(&claim)
            .await
            .ok_or(ChatError::Unauthenticated)?;

        let mut state = self.state.lock().await;
        if !state.outbound.contains_key(&conn) {
            // Disconnected while the directory was consulted.
            return Err(ChatError::Unauthenticated);
        }

        if let Some(evicted) = state.presence.identify(conn, &username) {
            state.rooms.leave(evicted);
            state.emit(
                evicted,
                ServerEvent::SessionReplaced {
                    username: username.clone(),
                },
            );
            info!(username = %username, evicted = %evicted, by = %conn, "Session replaced");
        }

        info!(
            conn = %conn,
            username = %username,
            online = state.presence.online_count(),
            "User online"
        );
        state.broadcast_online_users();
        Ok(username)
    }

    /// Tear down everything the connection owned and broadcast presence.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let mut state = self.state.lock().await;
        state.outbound.remove(&conn);
        state.rooms.leave(conn);
        let username = state.presence.forget(conn);

        info!(
            conn = %conn,
            username = username.as_deref().unwrap_or("-"),
            online = state.presence.online_count(),
            "Connection closed"
        );
        state.broadcast_online_users();
    }

    /// Route one decoded client event.
    pub async fn dispatch(&self, conn: ConnectionId, event: ClientEvent) -> Result<(), ChatError> {
        match event {
            ClientEvent::Identify { username } => {
                self.identify(conn, &username).await?;
            }
            ClientEvent::JoinChat { chat } => {
                self.join_chat(conn, Chat::try_from(chat)?).await?;
            }
            ClientEvent::SendMessage {
                body,
                chat,
                client_timestamp,
            } => {
                let delivery = self
                    .send_message(conn, Chat::try_from(chat)?, &body, client_timestamp)
                    .await?;
                trace!(
                    id = %delivery.message.id,
                    recipients = delivery.recipients.len(),
                    "Send accepted"
                );
                // Persistence finishes on its own.
                drop(delivery.persisted);
            }
            ClientEvent::Typing { chat } => match Chat::try_from(chat) {
                Ok(chat) => {
                    self.relay_typing(conn, &chat).await;
                }
                Err(e) => trace!(conn = %conn, error = %e, "Typing for malformed chat dropped"),
            },
        }
        Ok(())
    }

    /// Push an event to a single connection, if it is still open.
    pub async fn notify(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.state.lock().await.emit(conn, event)
    }

    pub async fn online_users(&self) -> Vec<String> {
        self.state.lock().await.presence.snapshot()
    }

    /// Snapshot of the hub's size, for health reporting.
    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            online: state.presence.online_count(),
            connections: state.outbound.len(),
            rooms: state.rooms.room_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{drain, memory_hub, online};

    async fn username_of(hub: &Hub, conn: ConnectionId) -> Option<String> {
        hub.state
            .lock()
            .await
            .presence
            .username(conn)
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_identify_broadcasts_to_everyone() {
        let hub = memory_hub();
        let (_, mut watcher) = hub.connect().await;
        let (alice, mut alice_rx) = online(&hub, "alice").await;

        let expected = ServerEvent::OnlineUsersChanged {
            users: vec!["alice".into()],
        };
        assert!(drain(&mut watcher).contains(&expected));
        assert!(drain(&mut alice_rx).contains(&expected));
        assert_eq!(username_of(&hub, alice).await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_identify_rejects_bad_username() {
        let hub = memory_hub();
        let (conn, _rx) = hub.connect().await;

        let err = hub.identify(conn, "  ").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidUsername(_)));
        assert!(hub.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_identify_evicts_first() {
        let hub = memory_hub();
        let (first, mut first_rx) = online(&hub, "alice").await;
        hub.join_chat(first, Chat::group(1)).await.unwrap();
        drain(&mut first_rx);

        let (second, _second_rx) = online(&hub, "alice").await;

        let events = drain(&mut first_rx);
        assert!(events.contains(&ServerEvent::SessionReplaced {
            username: "alice".into()
        }));
        assert!(username_of(&hub, first).await.is_none());
        assert_eq!(username_of(&hub, second).await.as_deref(), Some("alice"));
        assert!(hub.state.lock().await.rooms.leave(first).is_none());

        // The evicted socket closing must not take alice offline.
        hub.disconnect(first).await;
        assert_eq!(hub.online_users().await, ["alice"]);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up() {
        let hub = memory_hub();
        let (alice, _alice_rx) = online(&hub, "alice").await;
        let (_bob, mut bob_rx) = online(&hub, "bob").await;
        hub.join_chat(alice, Chat::group(2)).await.unwrap();
        drain(&mut bob_rx);

        hub.disconnect(alice).await;

        assert_eq!(hub.online_users().await, ["bob"]);
        assert_eq!(
            hub.stats().await,
            HubStats {
                online: 1,
                connections: 1,
                rooms: 0
            }
        );
        assert_eq!(
            drain(&mut bob_rx),
            [ServerEvent::OnlineUsersChanged {
                users: vec!["bob".into()]
            }]
        );
    }

    #[tokio::test]
    async fn test_unidentified_disconnect_still_broadcasts() {
        let hub = memory_hub();
        let (_alice, mut alice_rx) = online(&hub, "alice").await;
        let (anon, _anon_rx) = hub.connect().await;
        drain(&mut alice_rx);

        hub.disconnect(anon).await;

        assert_eq!(
            drain(&mut alice_rx),
            [ServerEvent::OnlineUsersChanged {
                users: vec!["alice".into()]
            }]
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_events() {
        let settings = HubSettings {
            outbound_queue_depth: 1,
            ..HubSettings::default()
        };
        let hub = crate::test_support::memory_hub_with(settings);
        let (conn, mut rx) = hub.connect().await;

        assert!(hub.notify(conn, ServerEvent::SessionReplaced { username: "a".into() }).await);
        assert!(!hub.notify(conn, ServerEvent::SessionReplaced { username: "b".into() }).await);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_bad_chat() {
        let hub = memory_hub();
        let (alice, _rx) = online(&hub, "alice").await;

        let raw = r#"{"type":"join-chat","chatType":"group","chatId":"abc"}"#;
        let event = ClientEvent::from_json(raw).unwrap();
        let err = hub.dispatch(alice, event).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidChat(_)));
    }

    #[tokio::test]
    async fn test_dispatch_drops_typing_for_bad_chat() {
        let hub = memory_hub();
        let (anon, mut anon_rx) = hub.connect().await;
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        drain(&mut anon_rx);
        drain(&mut alice_rx);

        let raw = r#"{"type":"typing","chatType":"group","chatId":"abc"}"#;
        for conn in [anon, alice] {
            let event = ClientEvent::from_json(raw).unwrap();
            assert!(hub.dispatch(conn, event).await.is_ok());
        }
        assert!(drain(&mut anon_rx).is_empty());
        assert!(drain(&mut alice_rx).is_empty());
    }
}
