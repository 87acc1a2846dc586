use mingle_shared::types::{ChatId, UserId};
use tracing::info;

use mingle_store::models::{Chat, ChatSettings, NewChat, Participant, ParticipantRole};

use crate::error::{ClientError, ClientResult};
use crate::state::AppState;

/// Create a chat owned by the signed-in user.
pub async fn create_chat(state: &AppState, name: &str, is_group: bool) -> ClientResult<Chat> {
    let session = state.session.current_session()?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::Invalid("chat name cannot be empty".into()));
    }

    // The creator's profile row must exist before it can own anything.
    state.services.store.ensure_user(&session).await?;

    let chat = state
        .services
        .store
        .create_chat(
            session.user_id,
            NewChat {
                name: name.to_string(),
                is_group,
            },
        )
        .await?;
    info!(chat_id = %chat.id, user_id = %session.user_id, "chat created");
    Ok(chat)
}

pub async fn get_chat(state: &AppState, id: ChatId) -> ClientResult<Chat> {
    let viewer = state.viewer()?;
    Ok(state.services.store.get_chat(viewer, id).await?)
}

/// Only the creator may delete. Open threads observe the delete event.
pub async fn delete_chat(state: &AppState, id: ChatId) -> ClientResult<()> {
    let viewer = state.viewer()?;
    state.services.store.delete_chat(viewer, id).await?;
    info!(chat_id = %id, "chat deleted");
    Ok(())
}

/// Leaving keeps the participant row with `left_at` set.
pub async fn leave_chat(state: &AppState, id: ChatId) -> ClientResult<Participant> {
    let viewer = state.viewer()?;
    let row = state.services.store.leave_chat(viewer, id).await?;
    state.clear_open_chat(id);
    info!(chat_id = %id, "left chat");
    Ok(row)
}

pub async fn update_settings(state: &AppState, id: ChatId, settings: ChatSettings) -> ClientResult<Chat> {
    let viewer = state.viewer()?;
    Ok(state
        .services
        .store
        .update_chat_settings(viewer, id, settings)
        .await?)
}

pub async fn list_participants(state: &AppState, id: ChatId) -> ClientResult<Vec<Participant>> {
    let viewer = state.viewer()?;
    Ok(state.services.store.list_participants(viewer, id).await?)
}

pub async fn set_role(
    state: &AppState,
    chat: ChatId,
    user: UserId,
    role: ParticipantRole,
) -> ClientResult<Participant> {
    let viewer = state.viewer()?;
    Ok(state.services.store.set_role(viewer, chat, user, role).await?)
}

pub async fn remove_participant(state: &AppState, chat: ChatId, user: UserId) -> ClientResult<()> {
    let viewer = state.viewer()?;
    state
        .services
        .store
        .remove_participant(viewer, chat, user)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mingle_shared::BackendError;

    use super::*;
    use crate::fixtures::{backend, device};
    use crate::state::Services;

    #[tokio::test]
    async fn create_requires_session_and_name() {
        let backend = backend();
        let anonymous = AppState::headless(Services::local_device(backend.clone()));
        assert_eq!(
            create_chat(&anonymous, "Team", true).await.unwrap_err(),
            ClientError::NotSignedIn
        );

        let ada = device(&backend, "ada").await;
        assert!(matches!(
            create_chat(&ada, "   ", true).await,
            Err(ClientError::Invalid(_))
        ));

        let chat = create_chat(&ada, " Team ", true).await.unwrap();
        assert_eq!(chat.name, "Team");
        let members = list_participants(&ada, chat.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, ParticipantRole::Owner);
    }

    #[tokio::test]
    async fn only_creator_deletes() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let bob = device(&backend, "bob").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();
        bob.services
            .store
            .join_chat(bob.viewer().unwrap(), chat.id)
            .await
            .unwrap();

        assert_eq!(
            delete_chat(&bob, chat.id).await.unwrap_err(),
            ClientError::Backend(BackendError::AccessDenied)
        );
        delete_chat(&ada, chat.id).await.unwrap();
        assert!(matches!(
            get_chat(&ada, chat.id).await,
            Err(ClientError::Backend(BackendError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn roles_and_removal() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let bob = device(&backend, "bob").await;
        let bob_id = bob.viewer().unwrap();
        let chat = create_chat(&ada, "Team", true).await.unwrap();
        bob.services.store.join_chat(bob_id, chat.id).await.unwrap();

        let promoted = set_role(&ada, chat.id, bob_id, ParticipantRole::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, ParticipantRole::Admin);

        let left = leave_chat(&bob, chat.id).await.unwrap();
        assert!(!left.is_active());

        remove_participant(&ada, chat.id, bob_id).await.unwrap();
        let members = list_participants(&ada, chat.id).await.unwrap();
        assert!(members.iter().all(|p| p.user_id != bob_id));
    }
}
