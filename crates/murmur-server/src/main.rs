//! # murmur-server
//!
//! Real-time chat delivery server.
//!
//! This binary provides:
//! - **WebSocket transport** (`/ws`) carrying JSON chat events
//! - **Presence registry** broadcasting the online user set on every change
//! - **Room manager** holding each connection in at most one chat room
//! - **Message router** delivering live to direct peers and group rooms, then
//!   persisting to SQLite in the background
//! - **History loader** answering a room join with the recent backlog
//! - **Typing relay** for ephemeral typing notifications
//! - **REST API** (axum) for health, online users, accounts and groups
//! - **Rate limiting** per IP for HTTP and per connection for chat events

mod api;
mod config;
mod directory;
mod error;
mod history;
mod hub;
mod presence;
mod rate_limit;
mod rooms;
mod router;
mod store;
mod typing;
mod ws;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use murmur_shared::constants::APP_NAME;
use murmur_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::directory::{AccountDirectory, OpenDirectory, RegisteredDirectory};
use crate::hub::{Hub, HubSettings};
use crate::rate_limit::RateLimiter;
use crate::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,murmur_server=debug")),
        )
        .init();

    info!("Starting {} chat server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the message store
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Database::open_at(path)?
        }
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Database ready");

    let store = SqliteStore::new(db);

    // -----------------------------------------------------------------------
    // 4. Initialize subsystems
    // -----------------------------------------------------------------------
    let directory: Arc<dyn AccountDirectory> = if config.require_registered {
        Arc::new(RegisteredDirectory::new(store.clone()))
    } else {
        Arc::new(OpenDirectory)
    };

    let hub = Hub::new(
        Arc::new(store.clone()),
        directory,
        HubSettings::from(&config),
    );

    let http_limiter = RateLimiter::new(config.http_rate, config.http_burst);
    let event_limiter = RateLimiter::new(config.event_rate, config.event_burst);

    let app_state = AppState {
        hub,
        store,
        http_limiter: http_limiter.clone(),
        event_limiter: event_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 5. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            http_limiter.purge_stale(600.0).await;
            event_limiter.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 6. Run the HTTP + WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
