//! Helpers shared by the hub tests.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_shared::{ConnectionId, GroupId, Message, ServerEvent};
use murmur_store::{Database, MessageFilter, StoreError};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::directory::OpenDirectory;
use crate::hub::{Hub, HubSettings};
use crate::rate_limit::RateLimiter;
use crate::store::{MessageStore, SqliteStore};

/// A store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl MessageStore for FailingStore {
    async fn append(&self, _message: Message) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    async fn query(
        &self,
        _filter: MessageFilter,
        _limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    async fn group_members(&self, _group: GroupId) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }
}

pub fn hub_with_store(store: Arc<dyn MessageStore>, settings: HubSettings) -> Hub {
    Hub::new(store, Arc::new(OpenDirectory), settings)
}

pub fn memory_hub_and_store() -> (Hub, SqliteStore) {
    let store = SqliteStore::new(Database::open_in_memory().unwrap());
    let hub = hub_with_store(Arc::new(store.clone()), HubSettings::default());
    (hub, store)
}

pub fn memory_hub_with(settings: HubSettings) -> Hub {
    let store = SqliteStore::new(Database::open_in_memory().unwrap());
    hub_with_store(Arc::new(store), settings)
}

pub fn memory_hub() -> Hub {
    memory_hub_with(HubSettings::default())
}

/// Connect and identify in one go.
pub async fn online(hub: &Hub, username: &str) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
    let (conn, rx) = hub.connect().await;
    hub.identify(conn, username).await.unwrap();
    (conn, rx)
}

/// Everything currently queued for a connection.
pub fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The live messages among `events`.
pub fn delivered(events: &[ServerEvent]) -> Vec<Message> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::MessageDelivered(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Application state over an in-memory database.
pub fn app_state() -> AppState {
    let config = ServerConfig::default();
    let store = SqliteStore::new(Database::open_in_memory().unwrap());
    let hub = hub_with_store(Arc::new(store.clone()), HubSettings::from(&config));
    AppState {
        hub,
        store,
        http_limiter: RateLimiter::new(config.http_rate, config.http_burst),
        event_limiter: RateLimiter::new(config.event_rate, config.event_burst),
        config: Arc::new(config),
    }
}
