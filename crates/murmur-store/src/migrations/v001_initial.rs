//! v001 -- Initial schema creation.
//!
//! Creates the account directory (`users`) and the append-only `messages`
//! log.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (account directory, read-only to the delivery core)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    username   TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL                  -- RFC-3339
);

-- ----------------------------------------------------------------
-- Messages (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    sender           TEXT NOT NULL,
    recipient        TEXT,                        -- peer for direct chats
    body             TEXT NOT NULL,
    chat_type        TEXT NOT NULL,               -- 'direct' | 'group'
    chat_id          TEXT NOT NULL,
    timestamp        TEXT NOT NULL,               -- RFC-3339, fixed micros, UTC
    client_timestamp TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_sender_ts
    ON messages(sender, timestamp);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_type, chat_id, timestamp);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
