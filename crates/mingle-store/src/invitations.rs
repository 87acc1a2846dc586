//! Email invitations and push tokens.

use rusqlite::{params, params_from_iter};

use mingle_shared::types::{ChatId, InvitationId, UserId};

use crate::database::{bad_label, fmt_ts, parse_ts, parse_uuid, placeholders, Database};
use crate::error::Result;
use crate::models::{Invitation, InvitationStatus, PushToken};

impl Database {
    // ------------------------------------------------------------------
    // Invitations
    // ------------------------------------------------------------------

    /// Insert a batch of invitations atomically.
    pub fn insert_invitations(&mut self, invitations: &[Invitation]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        for invitation in invitations {
            tx.execute(
                "INSERT INTO invitations (id, chat_id, inviter_id, invitee_email, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    invitation.id.to_string(),
                    invitation.chat_id.to_string(),
                    invitation.inviter_id.to_string(),
                    invitation.invitee_email,
                    invitation.status.as_str(),
                    fmt_ts(&invitation.created_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_invitations(&self, chat: ChatId) -> Result<Vec<Invitation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, inviter_id, invitee_email, status, created_at
             FROM invitations WHERE chat_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![chat.to_string()], row_to_invitation)?;

        let mut invitations = Vec::new();
        for row in rows {
            invitations.push(row?);
        }
        Ok(invitations)
    }

    /// Mark every pending invitation of `email` to `chat` as accepted and
    /// return the updated rows.
    pub fn accept_invitations(&self, chat: ChatId, email: &str) -> Result<Vec<Invitation>> {
        let pending: Vec<Invitation> = self
            .list_invitations(chat)?
            .into_iter()
            .filter(|i| i.status == InvitationStatus::Pending && i.invitee_email == email)
            .collect();

        self.conn().execute(
            "UPDATE invitations SET status = ?1
             WHERE chat_id = ?2 AND invitee_email = ?3 AND status = ?4",
            params![
                InvitationStatus::Accepted.as_str(),
                chat.to_string(),
                email,
                InvitationStatus::Pending.as_str(),
            ],
        )?;

        Ok(pending
            .into_iter()
            .map(|mut i| {
                i.status = InvitationStatus::Accepted;
                i
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Push tokens
    // ------------------------------------------------------------------

    /// One token per user: a new registration replaces the previous one.
    pub fn upsert_push_token(&self, token: &PushToken) -> Result<()> {
        self.conn().execute(
            "INSERT INTO user_push_tokens (user_id, push_token, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                push_token = excluded.push_token,
                created_at = excluded.created_at",
            params![
                token.user_id.to_string(),
                token.push_token,
                fmt_ts(&token.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_push_tokens(&self, users: &[UserId]) -> Result<Vec<PushToken>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT user_id, push_token, created_at FROM user_push_tokens
             WHERE user_id IN ({})",
            placeholders(users.len())
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(users.iter().map(|u| u.to_string())), |row| {
            let user_str: String = row.get(0)?;
            let ts_str: String = row.get(2)?;
            Ok(PushToken {
                user_id: UserId(parse_uuid(0, &user_str)?),
                push_token: row.get(1)?,
                created_at: parse_ts(2, &ts_str)?,
            })
        })?;

        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?);
        }
        Ok(tokens)
    }
}

fn row_to_invitation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invitation> {
    let id_str: String = row.get(0)?;
    let chat_str: String = row.get(1)?;
    let inviter_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let ts_str: String = row.get(5)?;

    Ok(Invitation {
        id: InvitationId(parse_uuid(0, &id_str)?),
        chat_id: ChatId(parse_uuid(1, &chat_str)?),
        inviter_id: UserId(parse_uuid(2, &inviter_str)?),
        invitee_email: row.get(3)?,
        status: InvitationStatus::parse(&status_str).ok_or_else(|| bad_label(4, &status_str))?,
        created_at: parse_ts(5, &ts_str)?,
    })
}
