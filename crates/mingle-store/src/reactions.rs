use rusqlite::{params, params_from_iter, OptionalExtension};

use mingle_shared::types::{ChatId, MessageId, ReactionId, UserId};

use crate::database::{fmt_ts, parse_ts, parse_uuid, placeholders, Database};
use crate::error::Result;
use crate::models::Reaction;

const REACTION_COLUMNS: &str = "id, message_id, chat_id, user_id, emoji, created_at";

impl Database {
    /// Insert a reaction row. A second row for the same
    /// `(message, user, emoji)` fails with a unique violation.
    pub fn insert_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.conn().execute(
            "INSERT INTO reactions (id, message_id, chat_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reaction.id.to_string(),
                reaction.message_id.to_string(),
                reaction.chat_id.to_string(),
                reaction.user_id.to_string(),
                reaction.emoji,
                fmt_ts(&reaction.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_reaction(
        &self,
        message_id: MessageId,
        user: UserId,
        emoji: &str,
    ) -> Result<Option<Reaction>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {REACTION_COLUMNS} FROM reactions
                     WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3"
                ),
                params![message_id.to_string(), user.to_string(), emoji],
                row_to_reaction,
            )
            .optional()?)
    }

    /// Delete by the natural key; returns the removed row if there was one.
    pub fn remove_reaction(
        &self,
        message_id: MessageId,
        user: UserId,
        emoji: &str,
    ) -> Result<Option<Reaction>> {
        let existing = self.find_reaction(message_id, user, emoji)?;
        if let Some(reaction) = &existing {
            self.conn().execute(
                "DELETE FROM reactions WHERE id = ?1",
                params![reaction.id.to_string()],
            )?;
        }
        Ok(existing)
    }

    /// Reactions for a batch of messages in one query, oldest first.
    pub fn get_reactions_for_messages(&self, message_ids: &[MessageId]) -> Result<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {REACTION_COLUMNS} FROM reactions
             WHERE message_id IN ({})
             ORDER BY created_at ASC, id ASC",
            placeholders(message_ids.len())
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(message_ids.iter().map(|id| id.to_string())),
            row_to_reaction,
        )?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }

    /// Reactions attached to a message, used to emit Delete events before a
    /// cascading delete removes them.
    pub fn get_reactions_for_message(&self, message_id: MessageId) -> Result<Vec<Reaction>> {
        self.get_reactions_for_messages(&[message_id])
    }
}

fn row_to_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reaction> {
    let id_str: String = row.get(0)?;
    let msg_id_str: String = row.get(1)?;
    let chat_id_str: String = row.get(2)?;
    let user_str: String = row.get(3)?;
    let ts_str: String = row.get(5)?;

    Ok(Reaction {
        id: ReactionId(parse_uuid(0, &id_str)?),
        message_id: MessageId(parse_uuid(1, &msg_id_str)?),
        chat_id: ChatId(parse_uuid(2, &chat_id_str)?),
        user_id: UserId(parse_uuid(3, &user_str)?),
        emoji: row.get(4)?,
        created_at: parse_ts(5, &ts_str)?,
    })
}
