//! Account/Session Directory.
//!
//! Resolves an `identify` claim made on a connection to an authenticated
//! username, or refuses it. Password checks and cookies live in front of
//! Murmur; the directory only decides which names may go online.

use async_trait::async_trait;
use murmur_shared::types::validate_username;
use murmur_shared::ConnectionId;
use tracing::{debug, warn};

use crate::store::SqliteStore;

/// What a connection claims when it identifies.
#[derive(Debug, Clone)]
pub struct SessionClaim {
    pub connection: ConnectionId,
    pub username: String,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// The username this connection is authenticated as, if any.
    async fn resolve_session(&self, claim: &SessionClaim) -> Option<String>;
}

/// Accepts any well-formed username.
#[derive(Debug, Clone, Default)]
pub struct OpenDirectory;

#[async_trait]
impl AccountDirectory for OpenDirectory {
    async fn resolve_session(&self, claim: &SessionClaim) -> Option<String> {
        validate_username(&claim.username).ok()
    }
}

/// Accepts only usernames registered in the store. Store errors fail closed.
#[derive(Clone)]
pub struct RegisteredDirectory {
    store: SqliteStore,
}

impl RegisteredDirectory {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccountDirectory for RegisteredDirectory {
    async fn resolve_session(&self, claim: &SessionClaim) -> Option<String> {
        let username = validate_username(&claim.username).ok()?;

        let lookup = username.clone();
        match self.store.run(move |db| db.user_exists(&lookup)).await {
            Ok(true) => Some(username),
            Ok(false) => {
                debug!(
                    conn = %claim.connection,
                    username = %username,
                    "Unregistered username refused"
                );
                None
            }
            Err(e) => {
                warn!(conn = %claim.connection, error = %e, "Directory lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use murmur_store::Database;

    use super::*;

    fn claim(username: &str) -> SessionClaim {
        SessionClaim {
            connection: ConnectionId::new(),
            username: username.to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_directory() {
        let dir = OpenDirectory;
        assert_eq!(dir.resolve_session(&claim(" alice ")).await.as_deref(), Some("alice"));
        assert!(dir.resolve_session(&claim("")).await.is_none());
    }

    #[tokio::test]
    async fn test_registered_directory() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        store.run(|db| db.create_user("alice")).await.unwrap();
        let dir = RegisteredDirectory::new(store);

        assert_eq!(dir.resolve_session(&claim("alice")).await.as_deref(), Some("alice"));
        assert!(dir.resolve_session(&claim("mallory")).await.is_none());
    }
}
