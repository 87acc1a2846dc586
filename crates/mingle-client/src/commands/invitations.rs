use tracing::{debug, info};

use mingle_shared::invite::{invite_url, parse_email_list, parse_invite_link};
use mingle_shared::types::ChatId;
use mingle_shared::BackendError;
use mingle_store::models::{Chat, Invitation};

use crate::error::ClientResult;
use crate::state::AppState;

/// Invite every address in a free-form list (split on `,`, `;` or
/// newlines). Malformed addresses fail the whole call; addresses that
/// already belong to participants are skipped.
pub async fn invite_by_email(state: &AppState, chat: ChatId, raw: &str) -> ClientResult<Vec<Invitation>> {
    let viewer = state.viewer()?;
    let emails = parse_email_list(raw)?;
    let invitations = state
        .services
        .store
        .create_invitations(viewer, chat, &emails)
        .await?;
    info!(chat_id = %chat, count = invitations.len(), "invitations sent");
    Ok(invitations)
}

pub fn invite_link(state: &AppState, chat: ChatId) -> String {
    invite_url(&state.config.site_url, chat)
}

/// Join the chat an invitation link points at.
pub async fn join_via_link(state: &AppState, link: &str) -> ClientResult<Chat> {
    let chat = parse_invite_link(link)?;
    join_via_invite(state, chat).await
}

/// Become a member of `chat` and accept any pending invitations to it.
/// Joining a chat one already belongs to is not an error.
pub async fn join_via_invite(state: &AppState, chat: ChatId) -> ClientResult<Chat> {
    let session = state.session.current_session()?;
    let store = &state.services.store;

    store.ensure_user(&session).await?;
    let row = store.get_chat(session.user_id, chat).await?;

    match store.add_member(session.user_id, chat).await {
        Ok(_) => info!(chat_id = %chat, "joined via invitation"),
        Err(BackendError::Conflict(_)) => debug!(chat_id = %chat, "already a participant"),
        Err(e) => return Err(e.into()),
    }

    let accepted = store.accept_invitations(session.user_id, chat).await?;
    if !accepted.is_empty() {
        debug!(chat_id = %chat, count = accepted.len(), "invitations accepted");
    }
    Ok(row)
}
