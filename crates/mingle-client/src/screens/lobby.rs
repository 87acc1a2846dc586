//! Chat list: every chat the viewer created or takes part in, newest first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use mingle_shared::protocol::{ChangeEvent, ChangeKind, Filter, Table, Topic};
use mingle_shared::types::{ChatId, UserId};
use mingle_store::models::{Chat, Participant};

use crate::error::ClientResult;
use crate::events::{emit_event, UiEvent};
use crate::screens::lock;
use crate::state::AppState;
use crate::sync::{SubscriptionHandle, TypedEvent, ViewState};

struct ChatListSync {
    state: Arc<AppState>,
    viewer: UserId,
    view: Mutex<ViewState<Chat>>,
    closed: AtomicBool,
}

impl ChatListSync {
    fn changed(&self) {
        emit_event(self.state.sink.as_ref(), UiEvent::ChatListChanged);
    }

    async fn refresh(&self) -> ClientResult<()> {
        let ticket = lock(&self.view).begin_snapshot();
        let chats = match self.state.fetcher().chat_list(self.viewer).await {
            Ok(chats) => chats,
            Err(e) => {
                lock(&self.view).abort_snapshot(ticket);
                return Err(e.into());
            }
        };
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        // False when a newer refresh started meanwhile; its snapshot wins.
        let applied = lock(&self.view).finish_snapshot(ticket, chats);
        if applied {
            self.changed();
        }
        Ok(())
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let sync = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.refresh().await {
                warn!(error = %e, "chat list resync failed");
            }
        });
    }

    /// Chat rows are broadcast to everyone; keep the ones that belong here.
    fn on_chat(self: &Arc<Self>, event: TypedEvent<Chat>) {
        match event {
            TypedEvent::Change(change) => {
                let mut view = lock(&self.view);
                let relevant = match change.kind {
                    ChangeKind::Insert => change.entity.created_by == self.viewer,
                    ChangeKind::Update => {
                        view.contains(&change.entity.id) || change.entity.created_by == self.viewer
                    }
                    ChangeKind::Delete => true,
                };
                if relevant && view.apply_change(change) {
                    drop(view);
                    self.changed();
                }
            }
            TypedEvent::Disconnected => self.lost(Table::Chats),
            TypedEvent::Resync => self.spawn_refresh(),
        }
    }

    /// The viewer's own membership rows decide which foreign chats show up.
    fn on_membership(self: &Arc<Self>, event: TypedEvent<Participant>) {
        match event {
            TypedEvent::Change(change) => {
                let row = change.entity;
                let joined = change.kind != ChangeKind::Delete && row.is_active();
                if joined {
                    self.spawn_add(row.chat_id);
                } else {
                    self.remove_unless_own(row.chat_id);
                }
            }
            TypedEvent::Disconnected => self.lost(Table::ChatParticipants),
            TypedEvent::Resync => self.spawn_refresh(),
        }
    }

    fn spawn_add(self: &Arc<Self>, chat: ChatId) {
        if lock(&self.view).contains(&chat) {
            return;
        }
        let sync = self.clone();
        tokio::spawn(async move {
            match sync.state.fetcher().chat(sync.viewer, chat).await {
                Ok(row) => {
                    if sync.closed.load(Ordering::SeqCst) {
                        return;
                    }
                    if lock(&sync.view).apply_change(ChangeEvent::insert(row)) {
                        sync.changed();
                    }
                }
                Err(e) => debug!(chat_id = %chat, error = %e, "joined chat not readable"),
            }
        });
    }

    fn remove_unless_own(&self, chat: ChatId) {
        let mut view = lock(&self.view);
        let Some(row) = view.get(&chat).cloned() else {
            return;
        };
        if row.created_by != self.viewer && view.apply_change(ChangeEvent::delete(row)) {
            drop(view);
            self.changed();
        }
    }

    fn lost(&self, table: Table) {
        emit_event(
            self.state.sink.as_ref(),
            UiEvent::SubscriptionLost {
                topic: table.to_string(),
            },
        );
    }
}

pub struct ChatListScreen {
    sync: Arc<ChatListSync>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl ChatListScreen {
    pub async fn mount(state: Arc<AppState>) -> ClientResult<Self> {
        let viewer = state.viewer()?;
        let sync = Arc::new(ChatListSync {
            state: state.clone(),
            viewer,
            view: Mutex::new(ViewState::descending()),
            closed: AtomicBool::new(false),
        });
        lock(&sync.view).begin_snapshot();

        let subscriber = state.subscriber();
        let on_chat = sync.clone();
        let chats = subscriber
            .subscribe_typed::<Chat, _>(Topic::new(Table::Chats, Filter::All), move |e| {
                on_chat.on_chat(e)
            })
            .await?;
        let on_membership = sync.clone();
        let memberships = subscriber
            .subscribe_typed::<Participant, _>(
                Topic::new(Table::ChatParticipants, Filter::UserId(viewer)),
                move |e| on_membership.on_membership(e),
            )
            .await?;

        let mut screen = Self {
            sync,
            subscriptions: vec![chats, memberships],
        };
        if let Err(e) = screen.sync.refresh().await {
            screen.unmount();
            return Err(e);
        }
        debug!(user_id = %viewer, "chat list mounted");
        Ok(screen)
    }

    pub fn chats(&self) -> Vec<Chat> {
        lock(&self.sync.view).to_vec()
    }

    pub fn version(&self) -> u64 {
        lock(&self.sync.view).version()
    }

    pub async fn refresh(&self) -> ClientResult<()> {
        self.sync.refresh().await
    }

    pub fn unmount(&mut self) {
        self.sync.closed.store(true, Ordering::SeqCst);
        for subscription in &mut self.subscriptions {
            subscription.close();
        }
        self.subscriptions.clear();
    }
}

impl Drop for ChatListScreen {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::chats::{create_chat, delete_chat, leave_chat};
    use crate::fixtures::{backend, device, eventually};

    fn names(screen: &ChatListScreen) -> Vec<String> {
        screen.chats().into_iter().map(|c| c.name).collect()
    }

    #[tokio::test]
    async fn own_chats_appear_and_disappear() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let bob = device(&backend, "bob").await;
        let screen = ChatListScreen::mount(ada.clone()).await.unwrap();
        assert!(screen.chats().is_empty());

        let first = create_chat(&ada, "First", true).await.unwrap();
        create_chat(&ada, "Second", true).await.unwrap();
        // Someone else's chat never shows up.
        create_chat(&bob, "Bob's", true).await.unwrap();

        eventually(|| names(&screen) == ["Second", "First"]).await;

        delete_chat(&ada, first.id).await.unwrap();
        eventually(|| names(&screen) == ["Second"]).await;
    }

    #[tokio::test]
    async fn joined_chats_follow_membership() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let bob = device(&backend, "bob").await;
        let team = create_chat(&bob, "Team", true).await.unwrap();

        let screen = ChatListScreen::mount(ada.clone()).await.unwrap();
        assert!(screen.chats().is_empty());

        ada.services
            .store
            .join_chat(ada.viewer().unwrap(), team.id)
            .await
            .unwrap();
        eventually(|| names(&screen) == ["Team"]).await;

        leave_chat(&ada, team.id).await.unwrap();
        eventually(|| screen.chats().is_empty()).await;
    }

    #[tokio::test]
    async fn unmount_freezes_the_view() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let mut screen = ChatListScreen::mount(ada.clone()).await.unwrap();
        screen.unmount();

        create_chat(&ada, "Late", true).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(screen.chats().is_empty());
    }
}
