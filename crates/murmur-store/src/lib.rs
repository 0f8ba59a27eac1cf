//! # murmur-store
//!
//! Durable storage for Murmur, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the append-only
//! message log, the account directory and group membership. The server
//! drives it from blocking tasks so store latency never stalls delivery.

pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use messages::MessageFilter;
pub use models::*;
