//! CRUD operations for [`User`] profile rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

use mingle_shared::types::UserId;

use crate::database::{fmt_ts, not_found, parse_opt_ts, parse_ts, parse_uuid, placeholders, Database};
use crate::error::Result;
use crate::models::{ProfilePatch, User};

const USER_COLUMNS: &str = "id, email, display_name, avatar_url, online_at, created_at";

impl Database {
    /// Insert a profile row.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, email, display_name, avatar_url, online_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.display_name,
                user.avatar_url,
                user.online_at.as_ref().map(fmt_ts),
                fmt_ts(&user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .optional()?)
    }

    /// Batch lookup; unknown ids are skipped.
    pub fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id IN ({}) ORDER BY created_at ASC",
            placeholders(ids.len())
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|id| id.to_string())), row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Apply a profile patch and return the updated row.
    pub fn update_user_profile(&self, id: UserId, patch: &ProfilePatch) -> Result<User> {
        let mut user = self.get_user(id)?;
        if let Some(name) = &patch.display_name {
            user.display_name = name.clone();
        }
        if let Some(avatar) = &patch.avatar_url {
            user.avatar_url = avatar.clone();
        }

        self.conn().execute(
            "UPDATE users SET display_name = ?1, avatar_url = ?2 WHERE id = ?3",
            params![user.display_name, user.avatar_url, id.to_string()],
        )?;
        Ok(user)
    }

    /// Record a presence heartbeat.
    pub fn set_user_online_at(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET online_at = ?1 WHERE id = ?2",
            params![fmt_ts(&at), id.to_string()],
        )?;
        if affected == 0 {
            return Err(crate::error::StoreError::NotFound);
        }
        self.get_user(id)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let online_str: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(User {
        id: UserId(parse_uuid(0, &id_str)?),
        email: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        online_at: parse_opt_ts(4, online_str)?,
        created_at: parse_ts(5, &created_str)?,
    })
}
