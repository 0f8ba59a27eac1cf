//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use murmur_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_OUTBOUND_QUEUE_DEPTH, HISTORY_LIMIT, MAX_MESSAGE_LEN,
};

/// How the history loader selects the backlog of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFilter {
    /// Messages authored by the chat's participants, in any chat.
    Sender,
    /// Only messages addressed to this exact direct pair or group.
    Thread,
}

impl FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sender" => Ok(HistoryFilter::Sender),
            "thread" => Ok(HistoryFilter::Thread),
            other => Err(format!("expected `sender` or `thread`, got {other:?}")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: the platform data directory (see `Database::default_path`).
    pub database_path: Option<PathBuf>,

    /// Maximum number of messages in a `history` response (1..=50).
    /// Env: `HISTORY_LIMIT`
    pub history_limit: usize,

    /// Backlog selection policy.
    /// Env: `HISTORY_FILTER` (`sender` | `thread`)
    /// Default: `sender`
    pub history_filter: HistoryFilter,

    /// Only let registered usernames identify.
    /// Env: `REQUIRE_REGISTERED` (true/false)
    /// Default: `false`
    pub require_registered: bool,

    /// Maximum message body in bytes.
    /// Env: `MAX_MESSAGE_LEN`
    pub max_message_len: usize,

    /// Events buffered per connection before new ones are dropped.
    /// Env: `OUTBOUND_QUEUE_DEPTH`
    pub outbound_queue_depth: usize,

    /// Sustained inbound WebSocket events per second, per connection.
    /// Env: `EVENT_RATE`
    pub event_rate: f64,

    /// Inbound WebSocket event burst, per connection.
    /// Env: `EVENT_BURST`
    pub event_burst: f64,

    /// Sustained HTTP requests per second, per IP.
    /// Env: `HTTP_RATE`
    pub http_rate: f64,

    /// HTTP request burst, per IP.
    /// Env: `HTTP_BURST`
    pub http_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            history_limit: HISTORY_LIMIT,
            history_filter: HistoryFilter::Sender,
            require_registered: false,
            max_message_len: MAX_MESSAGE_LEN,
            outbound_queue_depth: DEFAULT_OUTBOUND_QUEUE_DEPTH,
            event_rate: 20.0,
            event_burst: 40.0,
            http_rate: 10.0,
            http_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("HISTORY_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) => config.history_limit = n.clamp(1, HISTORY_LIMIT),
                Err(_) => tracing::warn!(value = %val, "Invalid HISTORY_LIMIT, using default"),
            }
        }

        if let Some(val) = lookup("HISTORY_FILTER") {
            match val.parse::<HistoryFilter>() {
                Ok(filter) => config.history_filter = filter,
                Err(e) => tracing::warn!(error = %e, "Invalid HISTORY_FILTER, using default"),
            }
        }

        if let Some(val) = lookup("REQUIRE_REGISTERED") {
            config.require_registered = val == "true" || val == "1";
        }

        if let Some(val) = lookup("MAX_MESSAGE_LEN") {
            match val.parse::<usize>() {
                Ok(n) => config.max_message_len = n.max(1),
                Err(_) => tracing::warn!(value = %val, "Invalid MAX_MESSAGE_LEN, using default"),
            }
        }

        if let Some(val) = lookup("OUTBOUND_QUEUE_DEPTH") {
            match val.parse::<usize>() {
                Ok(n) => config.outbound_queue_depth = n.max(1),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid OUTBOUND_QUEUE_DEPTH, using default")
                }
            }
        }

        parse_rate(&lookup, "EVENT_RATE", &mut config.event_rate);
        parse_rate(&lookup, "EVENT_BURST", &mut config.event_burst);
        parse_rate(&lookup, "HTTP_RATE", &mut config.http_rate);
        parse_rate(&lookup, "HTTP_BURST", &mut config.http_burst);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_rate<F>(lookup: &F, key: &str, slot: &mut f64)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        match val.parse::<f64>() {
            Ok(n) if n > 0.0 => *slot = n,
            _ => tracing::warn!(key, value = %val, "Invalid rate setting, using default"),
        }
    }
}
