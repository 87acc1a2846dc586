//! Chat membership rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use mingle_shared::types::{ChatId, UserId};

use crate::database::{bad_label, fmt_ts, parse_opt_ts, parse_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::{Participant, ParticipantRole};

const PARTICIPANT_COLUMNS: &str = "chat_id, user_id, role, joined_at, left_at";

impl Database {
    /// Plain insert; fails with a unique violation if the pair exists.
    pub fn insert_participant(&self, participant: &Participant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chat_participants (chat_id, user_id, role, joined_at, left_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                participant.chat_id.to_string(),
                participant.user_id.to_string(),
                participant.role.as_str(),
                fmt_ts(&participant.joined_at),
                participant.left_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    /// Insert or rejoin: on conflict the role and `joined_at` are replaced and
    /// `left_at` is cleared.
    pub fn upsert_participant(&self, participant: &Participant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chat_participants (chat_id, user_id, role, joined_at, left_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (chat_id, user_id) DO UPDATE SET
                role = excluded.role,
                joined_at = excluded.joined_at,
                left_at = excluded.left_at",
            params![
                participant.chat_id.to_string(),
                participant.user_id.to_string(),
                participant.role.as_str(),
                fmt_ts(&participant.joined_at),
                participant.left_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    pub fn get_participant(&self, chat: ChatId, user: UserId) -> Result<Participant> {
        self.find_participant(chat, user)?
            .ok_or(crate::error::StoreError::NotFound)
    }

    pub fn find_participant(&self, chat: ChatId, user: UserId) -> Result<Option<Participant>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM chat_participants
                     WHERE chat_id = ?1 AND user_id = ?2"
                ),
                params![chat.to_string(), user.to_string()],
                row_to_participant,
            )
            .optional()?)
    }

    /// All membership rows of a chat (including those who left), by join time.
    pub fn list_participants(&self, chat: ChatId) -> Result<Vec<Participant>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM chat_participants
             WHERE chat_id = ?1
             ORDER BY joined_at ASC"
        ))?;
        let rows = stmt.query_map(params![chat.to_string()], row_to_participant)?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    pub fn set_participant_role(
        &self,
        chat: ChatId,
        user: UserId,
        role: ParticipantRole,
    ) -> Result<Participant> {
        let affected = self.conn().execute(
            "UPDATE chat_participants SET role = ?1 WHERE chat_id = ?2 AND user_id = ?3",
            params![role.as_str(), chat.to_string(), user.to_string()],
        )?;
        if affected == 0 {
            return Err(crate::error::StoreError::NotFound);
        }
        self.get_participant(chat, user)
    }

    /// Mark a participant as having left, keeping the row.
    pub fn set_participant_left(
        &self,
        chat: ChatId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> Result<Participant> {
        let affected = self.conn().execute(
            "UPDATE chat_participants SET left_at = ?1 WHERE chat_id = ?2 AND user_id = ?3",
            params![fmt_ts(&at), chat.to_string(), user.to_string()],
        )?;
        if affected == 0 {
            return Err(crate::error::StoreError::NotFound);
        }
        self.get_participant(chat, user)
    }

    /// Remove the membership row entirely. Returns the removed row.
    pub fn delete_participant(&self, chat: ChatId, user: UserId) -> Result<Participant> {
        let existing = self.get_participant(chat, user)?;
        self.conn().execute(
            "DELETE FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            params![chat.to_string(), user.to_string()],
        )?;
        Ok(existing)
    }
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let chat_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let role_str: String = row.get(2)?;
    let joined_str: String = row.get(3)?;
    let left_str: Option<String> = row.get(4)?;

    Ok(Participant {
        chat_id: ChatId(parse_uuid(0, &chat_str)?),
        user_id: UserId(parse_uuid(1, &user_str)?),
        role: ParticipantRole::parse(&role_str).ok_or_else(|| bad_label(2, &role_str))?,
        joined_at: parse_ts(3, &joined_str)?,
        left_at: parse_opt_ts(4, left_str)?,
    })
}
