use rusqlite::params;

use mingle_shared::types::{ChatId, MessageId, UserId};

use crate::database::{bad_label, fmt_ts, not_found, parse_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::{ContentType, Message};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, content_type, media_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.content_type.as_str(),
                message.media_url,
                fmt_ts(&message.created_at),
            ],
        )?;
        Ok(())
    }

    /// All messages of a chat, oldest first.
    pub fn get_messages_for_chat(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender_id, content, content_type, media_url, created_at
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, chat_id, sender_id, content, content_type, media_url, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let content_type_str: String = row.get(4)?;
    let ts_str: String = row.get(6)?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id_str)?),
        chat_id: ChatId(parse_uuid(1, &chat_id_str)?),
        sender_id: UserId(parse_uuid(2, &sender_str)?),
        content: row.get(3)?,
        content_type: ContentType::parse(&content_type_str)
            .ok_or_else(|| bad_label(4, &content_type_str))?,
        media_url: row.get(5)?,
        created_at: parse_ts(6, &ts_str)?,
    })
}
