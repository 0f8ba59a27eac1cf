//! Append-only message log and history range queries.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use murmur_shared::{ChatType, GroupId};

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::Message;

/// Which messages a history query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// Every message authored by any of these users, whatever the chat.
    /// This is the loose filter: a direct thread is approximated by the
    /// messages of both participants.
    SentBy(Vec<String>),

    /// Direct messages exchanged between exactly these two users.
    DirectThread { a: String, b: String },

    /// Messages addressed to this group.
    GroupThread(GroupId),
}

const MESSAGE_COLUMNS: &str =
    "id, sender, recipient, body, chat_type, chat_id, timestamp, client_timestamp";

impl Database {
    /// Append a message. There is no update or delete counterpart.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        if message.sender.is_empty() || message.body.is_empty() {
            return Err(StoreError::InvalidData(
                "message needs a sender and a body".into(),
            ));
        }

        self.conn().execute(
            "INSERT INTO messages (id, sender, recipient, body, chat_type, chat_id, timestamp, client_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                message.sender,
                message.recipient,
                message.body,
                message.chat_type.as_str(),
                message.chat_id,
                format_ts(&message.timestamp),
                message.client_timestamp.as_ref().map(format_ts),
            ],
        )?;
        Ok(())
    }

    /// Return the `limit` most recent messages matching `filter`, oldest
    /// first. Ties on timestamp fall back to insertion order.
    pub fn query_messages(&self, filter: &MessageFilter, limit: usize) -> Result<Vec<Message>> {
        let (clause, mut values): (String, Vec<Value>) = match filter {
            MessageFilter::SentBy(senders) => {
                if senders.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = vec!["?"; senders.len()].join(", ");
                (
                    format!("sender IN ({placeholders})"),
                    senders.iter().cloned().map(Value::Text).collect(),
                )
            }
            MessageFilter::DirectThread { a, b } => (
                "chat_type = 'direct' AND ((sender = ? AND recipient = ?) OR (sender = ? AND recipient = ?))"
                    .to_string(),
                vec![
                    Value::Text(a.clone()),
                    Value::Text(b.clone()),
                    Value::Text(b.clone()),
                    Value::Text(a.clone()),
                ],
            ),
            MessageFilter::GroupThread(group_id) => (
                "chat_type = 'group' AND chat_id = ?".to_string(),
                vec![Value::Text(group_id.to_string())],
            ),
        };
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE {clause}
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_type_str: String = row.get(4)?;
    let ts_str: String = row.get(6)?;
    let client_ts_str: Option<String> = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let chat_type: ChatType = chat_type_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        body: row.get(3)?,
        chat_type,
        chat_id: row.get(5)?,
        timestamp: parse_ts(6, &ts_str)?,
        client_timestamp: client_ts_str.as_deref().map(|s| parse_ts(7, s)).transpose()?,
    })
}
