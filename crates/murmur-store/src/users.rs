//! Account directory records.
//!
//! Registration lives here so the server can offer a directory backed by
//! the same database; credentials are handled outside Murmur.

use chrono::Utc;
use rusqlite::params;

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::User;

impl Database {
    /// Register a new username. Fails with `InvalidData` if it is taken.
    pub fn create_user(&self, username: &str) -> Result<User> {
        let now = Utc::now();

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, format_ts(&now)],
        )?;
        if inserted == 0 {
            return Err(StoreError::InvalidData(format!(
                "username {username:?} is already registered"
            )));
        }

        Ok(User {
            id: self.conn().last_insert_rowid(),
            username: username.to_string(),
            created_at: now,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        match self.get_user_by_name(username) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All registered users, ordered by username.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, created_at FROM users ORDER BY username ASC",
        )?;

        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let ts: String = row.get(2)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: parse_ts(2, &ts)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();

        assert_eq!(db.get_user(alice.id).unwrap().username, "alice");
        assert_eq!(db.get_user_by_name("alice").unwrap().id, alice.id);
        assert!(db.user_exists("alice").unwrap());
        assert!(!db.user_exists("bob").unwrap());
    }

    #[test]
    fn test_duplicate_username() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice").unwrap();
        assert!(matches!(db.create_user("alice"), Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_list_users_sorted() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("carol").unwrap();
        db.create_user("alice").unwrap();

        let names: Vec<_> = db
            .list_users()
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["alice", "carol"]);
    }

    #[test]
    fn test_missing_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(42), Err(StoreError::NotFound)));
    }
}
