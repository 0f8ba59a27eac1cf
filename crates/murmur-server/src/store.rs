//! Durable Message Store as seen by the delivery core.
//!
//! The hub only needs three operations, so it talks to the [`MessageStore`]
//! trait. [`SqliteStore`] implements it on top of `murmur-store`, running every
//! query on the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use murmur_shared::{GroupId, Message};
use murmur_store::{Database, MessageFilter, StoreError};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message.
    async fn append(&self, message: Message) -> Result<(), StoreError>;

    /// Most recent `limit` messages matching `filter`, oldest first.
    async fn query(&self, filter: MessageFilter, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Usernames of a group's members.
    async fn group_members(&self, group: GroupId) -> Result<Vec<String>, StoreError>;
}

/// SQLite-backed store shared by the hub, the directory and the REST API.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run a closure against the database on the blocking thread pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| StoreError::Io(std::io::Error::other("database lock poisoned")))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(format!("store task failed: {e}"))))?
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, message: Message) -> Result<(), StoreError> {
        self.run(move |db| db.insert_message(&message)).await
    }

    async fn query(&self, filter: MessageFilter, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.run(move |db| db.query_messages(&filter, limit)).await
    }

    async fn group_members(&self, group: GroupId) -> Result<Vec<String>, StoreError> {
        self.run(move |db| {
            Ok(db
                .list_group_members(group)?
                .into_iter()
                .map(|m| m.username)
                .collect())
        })
        .await
    }
}
