//! Group chats and their membership.
//!
//! Members are only ever added; there is no leave-group operation.

use chrono::Utc;
use rusqlite::params;

use murmur_shared::GroupId;

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{Group, GroupMember};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a group. The creator is always recorded as a (flagged) member,
    /// duplicates in `members` are ignored.
    pub fn create_group(&self, name: &str, creator: &str, members: &[String]) -> Result<Group> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidData("group name is empty".into()));
        }

        let now = Utc::now();
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO chat_groups (name, creator, created_at) VALUES (?1, ?2, ?3)",
            params![name, creator, format_ts(&now)],
        )?;
        let id = GroupId(tx.last_insert_rowid());

        tx.execute(
            "INSERT INTO group_members (group_id, username, is_creator, joined_at)
             VALUES (?1, ?2, 1, ?3)",
            params![id.0, creator, format_ts(&now)],
        )?;
        for member in members {
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, username, is_creator, joined_at)
                 VALUES (?1, ?2, 0, ?3)",
                params![id.0, member, format_ts(&now)],
            )?;
        }

        tx.commit()?;

        tracing::debug!(group = %id, name, creator, members = members.len(), "created group");

        Ok(Group {
            id,
            name: name.to_string(),
            creator: creator.to_string(),
            created_at: now,
        })
    }

    /// Add a member. Returns `false` if they already belonged to the group.
    pub fn add_group_member(&self, group_id: GroupId, username: &str) -> Result<bool> {
        // Surface NotFound for unknown groups instead of a FK error.
        self.get_group(group_id)?;

        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO group_members (group_id, username, is_creator, joined_at)
             VALUES (?1, ?2, 0, ?3)",
            params![group_id.0, username, format_ts(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        self.conn()
            .query_row(
                "SELECT id, name, creator, created_at FROM chat_groups WHERE id = ?1",
                params![id.0],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Members of a group, creator first, then by join order.
    pub fn list_group_members(&self, group_id: GroupId) -> Result<Vec<GroupMember>> {
        let mut stmt = self.conn().prepare(
            "SELECT group_id, username, is_creator, joined_at
             FROM group_members
             WHERE group_id = ?1
             ORDER BY is_creator DESC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![group_id.0], |row| {
            let ts: String = row.get(3)?;
            Ok(GroupMember {
                group_id: GroupId(row.get(0)?),
                username: row.get(1)?,
                is_creator: row.get::<_, i64>(2)? != 0,
                joined_at: parse_ts(3, &ts)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Groups the user belongs to, newest first.
    pub fn list_groups_for_user(&self, username: &str) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(
            "SELECT g.id, g.name, g.creator, g.created_at
             FROM chat_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.username = ?1
             ORDER BY g.created_at DESC, g.id DESC",
        )?;

        let rows = stmt.query_map(params![username], row_to_group)?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let ts: String = row.get(3)?;
    Ok(Group {
        id: GroupId(row.get(0)?),
        name: row.get(1)?,
        creator: row.get(2)?,
        created_at: parse_ts(3, &ts)?,
    })
}
