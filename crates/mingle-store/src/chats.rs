//! CRUD operations for [`Chat`] records.

use rusqlite::params;

use mingle_shared::types::{ChatId, UserId};

use crate::database::{fmt_ts, not_found, parse_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::{Chat, ChatSettings};

const CHAT_COLUMNS: &str = "id, name, is_group, created_by, participants_can_invite, \
     invitation_expiry_hours, only_admins_can_remove_messages, only_admins_can_edit_settings, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new chat.
    pub fn insert_chat(&self, chat: &Chat) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (id, name, is_group, created_by, participants_can_invite,
                                invitation_expiry_hours, only_admins_can_remove_messages,
                                only_admins_can_edit_settings, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                chat.id.to_string(),
                chat.name,
                chat.is_group,
                chat.created_by.to_string(),
                chat.settings.participants_can_invite,
                chat.settings.invitation_expiry_hours,
                chat.settings.only_admins_can_remove_messages,
                chat.settings.only_admins_can_edit_settings,
                fmt_ts(&chat.created_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(not_found)
    }

    /// Chats created by a user, newest first.
    pub fn list_chats_created_by(&self, user: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE created_by = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![user.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Chats a user currently participates in (not left), newest first.
    pub fn list_chats_participating(&self, user: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.name, c.is_group, c.created_by, c.participants_can_invite,
                    c.invitation_expiry_hours, c.only_admins_can_remove_messages,
                    c.only_admins_can_edit_settings, c.created_at
             FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ?1 AND p.left_at IS NULL
             ORDER BY c.created_at DESC, c.id DESC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_chat_settings(&self, id: ChatId, settings: &ChatSettings) -> Result<Chat> {
        let affected = self.conn().execute(
            "UPDATE chats SET participants_can_invite = ?1, invitation_expiry_hours = ?2,
                              only_admins_can_remove_messages = ?3, only_admins_can_edit_settings = ?4
             WHERE id = ?5",
            params![
                settings.participants_can_invite,
                settings.invitation_expiry_hours,
                settings.only_admins_can_remove_messages,
                settings.only_admins_can_edit_settings,
                id.to_string(),
            ],
        )?;
        if affected == 0 {
            return Err(crate::error::StoreError::NotFound);
        }
        self.get_chat(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a chat; participants, messages, reactions and invitations
    /// cascade.  Returns `true` if a row was deleted.
    pub fn delete_chat(&self, id: ChatId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM chats WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let created_by_str: String = row.get(3)?;
    let created_str: String = row.get(8)?;

    Ok(Chat {
        id: ChatId(parse_uuid(0, &id_str)?),
        name: row.get(1)?,
        is_group: row.get(2)?,
        created_by: UserId(parse_uuid(3, &created_by_str)?),
        settings: ChatSettings {
            participants_can_invite: row.get(4)?,
            invitation_expiry_hours: row.get(5)?,
            only_admins_can_remove_messages: row.get(6)?,
            only_admins_can_edit_settings: row.get(7)?,
        },
        created_at: parse_ts(8, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::StoreError;
    use crate::fixtures::{sample_chat, seeded};

    #[test]
    fn created_chats_are_newest_first() {
        let (db, user, first) = seeded();
        let mut second = sample_chat("Later", user.id);
        second.created_at = first.created_at + Duration::seconds(5);
        db.insert_chat(&second).unwrap();

        let chats = db.list_chats_created_by(user.id).unwrap();
        assert_eq!(
            chats.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[test]
    fn settings_update_round_trips() {
        let (db, _, chat) = seeded();
        let settings = ChatSettings {
            participants_can_invite: false,
            invitation_expiry_hours: Some(48),
            only_admins_can_remove_messages: true,
            only_admins_can_edit_settings: false,
        };
        let updated = db.update_chat_settings(chat.id, &settings).unwrap();
        assert_eq!(updated.settings, settings);
    }

    #[test]
    fn missing_chat_is_not_found() {
        let (db, _, chat) = seeded();
        assert!(db.delete_chat(chat.id).unwrap());
        assert!(!db.delete_chat(chat.id).unwrap());
        assert!(matches!(db.get_chat(chat.id), Err(StoreError::NotFound)));
    }
}
