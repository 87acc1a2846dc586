//! Point-in-time reads, ordered the way the views that consume them are.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use mingle_shared::types::{ChatId, MessageId, UserId};
use mingle_shared::BackendResult;
use mingle_store::backend::DataStore;
use mingle_store::models::{Chat, Message, Participant, Reaction, User};

pub struct SnapshotFetcher {
    store: Arc<dyn DataStore>,
}

impl SnapshotFetcher {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Chats the viewer created or actively takes part in, newest first.
    pub async fn chat_list(&self, viewer: UserId) -> BackendResult<Vec<Chat>> {
        let (created, participating) = futures::try_join!(
            self.store.chats_created_by(viewer),
            self.store.chats_participating(viewer),
        )?;

        let mut seen = HashSet::new();
        let mut chats: Vec<Chat> = created
            .into_iter()
            .chain(participating)
            .filter(|chat| seen.insert(chat.id))
            .collect();
        chats.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        debug!(user_id = %viewer, count = chats.len(), "fetched chat list");
        Ok(chats)
    }

    /// `NotFound` when the chat is gone.
    pub async fn chat(&self, viewer: UserId, id: ChatId) -> BackendResult<Chat> {
        self.store.get_chat(viewer, id).await
    }

    /// Oldest first.
    pub async fn messages(&self, viewer: UserId, chat: ChatId) -> BackendResult<Vec<Message>> {
        let mut messages = self.store.list_messages(viewer, chat).await?;
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(messages)
    }

    pub async fn reactions(
        &self,
        viewer: UserId,
        chat: ChatId,
        messages: &[MessageId],
    ) -> BackendResult<Vec<Reaction>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        self.store.list_reactions(viewer, chat, messages).await
    }

    pub async fn participants(&self, viewer: UserId, chat: ChatId) -> BackendResult<Vec<Participant>> {
        self.store.list_participants(viewer, chat).await
    }

    pub async fn users(&self, ids: &[UserId]) -> BackendResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.get_users(ids).await
    }

    /// Display names by user id. Unknown ids are left out.
    pub async fn display_names(&self, ids: &[UserId]) -> BackendResult<HashMap<UserId, String>> {
        Ok(self
            .users(ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user.display_name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use mingle_shared::BackendError;
    use mingle_store::backend::{AuthProvider, DataStore};
    use mingle_store::models::NewChat;
    use mingle_store::LocalBackend;

    use super::*;

    async fn account(backend: &LocalBackend, name: &str) -> UserId {
        let session = backend
            .sign_up(&format!("{name}@mingle.test"), "secret-pw", name)
            .await
            .unwrap();
        backend.ensure_user(&session).await.unwrap().id
    }

    fn chat(name: &str) -> NewChat {
        NewChat {
            name: name.into(),
            is_group: true,
        }
    }

    #[tokio::test]
    async fn chat_list_unions_created_and_joined() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let ada = account(&backend, "ada").await;
        let bob = account(&backend, "bob").await;

        let own = backend.create_chat(ada, chat("Own")).await.unwrap();
        let joined = backend.create_chat(bob, chat("Joined")).await.unwrap();
        let left = backend.create_chat(bob, chat("Left")).await.unwrap();
        let _foreign = backend.create_chat(bob, chat("Foreign")).await.unwrap();

        backend.join_chat(ada, joined.id).await.unwrap();
        backend.join_chat(ada, left.id).await.unwrap();
        backend.leave_chat(ada, left.id).await.unwrap();

        let fetcher = SnapshotFetcher::new(backend.clone());
        let list = fetcher.chat_list(ada).await.unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id).collect();

        // Own chat is both created and participating; it appears once.
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&own.id));
        assert!(ids.contains(&joined.id));
        assert!(list.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn deleted_chat_is_not_found() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let ada = account(&backend, "ada").await;
        let team = backend.create_chat(ada, chat("Team")).await.unwrap();
        backend.delete_chat(ada, team.id).await.unwrap();

        let fetcher = SnapshotFetcher::new(backend.clone());
        assert!(matches!(
            fetcher.chat(ada, team.id).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn no_messages_means_no_reaction_query() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        backend.set_offline(true);
        let fetcher = SnapshotFetcher::new(backend.clone());
        // Would fail with Transient if it reached the backend.
        assert!(fetcher
            .reactions(UserId::new(), ChatId::new(), &[])
            .await
            .unwrap()
            .is_empty());
    }
}
