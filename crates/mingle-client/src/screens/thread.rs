//! Message thread of one chat, with reactions and participants.
//!
//! Sending is optimistic: the message shows up at once as a pending entry
//! and is confirmed or rolled back when the write returns. Reactions are
//! pessimistic and only change once the backend has accepted the toggle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use mingle_shared::protocol::{ChangeEvent, ChangeKind, Filter, Table, Topic};
use mingle_shared::types::{ChatId, MessageId, UserId};
use mingle_shared::BackendError;
use mingle_store::models::{Chat, Message, Participant, Reaction};

use crate::commands::messaging::{self, Attachment};
use crate::commands::reactions::{ReactionToggler, ToggleOutcome};
use crate::error::{ClientError, ClientResult};
use crate::events::{emit_event, UiEvent};
use crate::screens::lock;
use crate::state::AppState;
use crate::sync::{summarize, ReactionSummaries, SubscriptionHandle, TypedEvent, ViewState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStatus {
    Loading,
    Ready,
    /// The chat no longer exists. Terminal.
    ChatDeleted,
    /// The viewer may not read this chat. Terminal.
    AccessDenied,
    Failed(String),
}

impl ThreadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ChatDeleted | Self::AccessDenied)
    }
}

/// Snapshot tickets of one refresh, one per view.
struct Tickets {
    messages: u64,
    reactions: u64,
    participants: u64,
}

struct ThreadSync {
    state: Arc<AppState>,
    chat_id: ChatId,
    viewer: UserId,
    status: Mutex<ThreadStatus>,
    chat: Mutex<Option<Chat>>,
    messages: Mutex<ViewState<Message>>,
    reactions: Mutex<ViewState<Reaction>>,
    participants: Mutex<ViewState<Participant>>,
    names: Mutex<HashMap<UserId, String>>,
    closed: AtomicBool,
}

impl ThreadSync {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn status(&self) -> ThreadStatus {
        lock(&self.status).clone()
    }

    fn emit(&self, event: UiEvent) {
        emit_event(self.state.sink.as_ref(), event);
    }

    fn thread_changed(&self) {
        self.emit(UiEvent::ThreadChanged {
            chat_id: self.chat_id,
        });
    }

    fn reactions_changed(&self) {
        self.emit(UiEvent::ReactionsChanged {
            chat_id: self.chat_id,
        });
    }

    fn set_status(&self, status: ThreadStatus) {
        let mut current = lock(&self.status);
        // Terminal states stick.
        if !current.is_terminal() {
            *current = status;
        }
    }

    fn begin_snapshots(&self) -> Tickets {
        Tickets {
            messages: lock(&self.messages).begin_snapshot(),
            reactions: lock(&self.reactions).begin_snapshot(),
            participants: lock(&self.participants).begin_snapshot(),
        }
    }

    async fn refresh(&self) -> ClientResult<()> {
        let tickets = self.begin_snapshots();
        let fetcher = self.state.fetcher();

        let loaded = async {
            let messages = fetcher.messages(self.viewer, self.chat_id).await?;
            let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
            let (reactions, participants) = futures::try_join!(
                fetcher.reactions(self.viewer, self.chat_id, &ids),
                fetcher.participants(self.viewer, self.chat_id),
            )?;

            let mut users: Vec<UserId> = participants.iter().map(|p| p.user_id).collect();
            users.extend(messages.iter().map(|m| m.sender_id));
            users.extend(reactions.iter().map(|r| r.user_id));
            users.sort();
            users.dedup();
            let names = fetcher.display_names(&users).await?;
            Ok::<_, BackendError>((messages, reactions, participants, names))
        }
        .await;

        let (messages, reactions, participants, names) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                lock(&self.messages).abort_snapshot(tickets.messages);
                lock(&self.reactions).abort_snapshot(tickets.reactions);
                lock(&self.participants).abort_snapshot(tickets.participants);
                self.fail(&e);
                return Err(e.into());
            }
        };
        if self.is_closed() {
            return Ok(());
        }

        lock(&self.names).extend(names);
        // Only the latest refresh may replace the views; an older one
        // finishing late would drop events the newer one is holding.
        let current = lock(&self.messages).finish_snapshot(tickets.messages, messages);
        lock(&self.reactions).finish_snapshot(tickets.reactions, reactions);
        lock(&self.participants).finish_snapshot(tickets.participants, participants);
        if !current {
            debug!(chat_id = %self.chat_id, "superseded thread snapshot dropped");
            return Ok(());
        }
        self.set_status(ThreadStatus::Ready);
        self.thread_changed();
        self.reactions_changed();
        Ok(())
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let sync = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.refresh().await {
                warn!(chat_id = %sync.chat_id, error = %e, "thread resync failed");
            }
        });
    }

    fn fail(&self, error: &BackendError) {
        let status = match error {
            BackendError::NotFound(_) => ThreadStatus::ChatDeleted,
            BackendError::AccessDenied => ThreadStatus::AccessDenied,
            other => ThreadStatus::Failed(other.to_string()),
        };
        self.set_status(status);
        self.thread_changed();
    }

    /// Load a display name the first time a user shows up.
    fn spawn_name_lookup(self: &Arc<Self>, user: UserId) {
        if lock(&self.names).contains_key(&user) {
            return;
        }
        let sync = self.clone();
        tokio::spawn(async move {
            match sync.state.fetcher().display_names(&[user]).await {
                Ok(found) if !found.is_empty() && !sync.is_closed() => {
                    lock(&sync.names).extend(found);
                    sync.reactions_changed();
                }
                Ok(_) => {}
                Err(e) => debug!(user_id = %user, error = %e, "name lookup failed"),
            }
        });
    }

    fn on_message(self: &Arc<Self>, event: TypedEvent<Message>) {
        match event {
            TypedEvent::Change(change) => {
                let sender = change.entity.sender_id;
                let inserted = change.kind == ChangeKind::Insert;
                if lock(&self.messages).apply_change(change) {
                    self.thread_changed();
                }
                if inserted {
                    self.spawn_name_lookup(sender);
                }
            }
            TypedEvent::Disconnected => self.lost(Table::Messages),
            TypedEvent::Resync => self.spawn_refresh(),
        }
    }

    fn on_reaction(self: &Arc<Self>, event: TypedEvent<Reaction>) {
        match event {
            TypedEvent::Change(change) => {
                let user = change.entity.user_id;
                if lock(&self.reactions).apply_change(change) {
                    self.reactions_changed();
                }
                self.spawn_name_lookup(user);
            }
            TypedEvent::Disconnected => self.lost(Table::Reactions),
            TypedEvent::Resync => self.spawn_refresh(),
        }
    }

    fn on_chat(self: &Arc<Self>, event: TypedEvent<Chat>) {
        match event {
            TypedEvent::Change(change) => match change.kind {
                ChangeKind::Delete => {
                    info!(chat_id = %self.chat_id, "open chat was deleted");
                    self.set_status(ThreadStatus::ChatDeleted);
                    self.emit(UiEvent::ChatDeleted {
                        chat_id: self.chat_id,
                    });
                }
                ChangeKind::Insert | ChangeKind::Update => {
                    *lock(&self.chat) = Some(change.entity);
                    self.thread_changed();
                }
            },
            TypedEvent::Disconnected => self.lost(Table::Chats),
            TypedEvent::Resync => self.spawn_refresh(),
        }
    }

    fn on_participant(self: &Arc<Self>, event: TypedEvent<Participant>) {
        match event {
            TypedEvent::Change(change) => {
                let row = change.entity.clone();
                if lock(&self.participants).apply_change(change) {
                    self.thread_changed();
                }
                if row.user_id == self.viewer && !row.is_active() {
                    debug!(chat_id = %self.chat_id, "viewer is no longer a participant");
                }
                self.spawn_name_lookup(row.user_id);
            }
            TypedEvent::Disconnected => self.lost(Table::ChatParticipants),
            TypedEvent::Resync => self.spawn_refresh(),
        }
    }

    fn lost(&self, table: Table) {
        self.emit(UiEvent::SubscriptionLost {
            topic: table.to_string(),
        });
    }
}

/// Clears the sending flag however the send ends.
struct SendingGuard<'a>(&'a AtomicBool);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ThreadScreen {
    sync: Arc<ThreadSync>,
    subscriptions: Vec<SubscriptionHandle>,
    sending: AtomicBool,
    toggler: ReactionToggler,
}

impl ThreadScreen {
    /// Open a thread. A deleted or forbidden chat is not an error: the
    /// screen mounts in the matching terminal status.
    pub async fn mount(state: Arc<AppState>, chat_id: ChatId) -> ClientResult<Self> {
        let viewer = state.viewer()?;
        let sync = Arc::new(ThreadSync {
            state: state.clone(),
            chat_id,
            viewer,
            status: Mutex::new(ThreadStatus::Loading),
            chat: Mutex::new(None),
            // The viewer's own rows may echo a send still in flight.
            messages: Mutex::new(
                ViewState::ascending().with_echo_filter(move |m: &Message| m.sender_id == viewer),
            ),
            reactions: Mutex::new(ViewState::ascending()),
            participants: Mutex::new(ViewState::ascending()),
            names: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let mut screen = Self {
            sync: sync.clone(),
            subscriptions: Vec::new(),
            sending: AtomicBool::new(false),
            toggler: ReactionToggler::new(state.services.store.clone()),
        };
        state.set_open_chat(Some(chat_id));

        let store = &state.services.store;
        let chat = match store.get_chat(viewer, chat_id).await {
            Ok(chat) => chat,
            Err(e @ (BackendError::NotFound(_) | BackendError::AccessDenied)) => {
                sync.fail(&e);
                return Ok(screen);
            }
            Err(e) => {
                screen.unmount();
                return Err(e.into());
            }
        };
        *lock(&sync.chat) = Some(chat);

        match store.join_chat(viewer, chat_id).await {
            Ok(_) => {}
            Err(e @ (BackendError::NotFound(_) | BackendError::AccessDenied)) => {
                sync.fail(&e);
                return Ok(screen);
            }
            Err(e) => {
                screen.unmount();
                return Err(e.into());
            }
        }

        sync.begin_snapshots();
        if let Err(e) = screen.subscribe_all().await {
            screen.unmount();
            return Err(e);
        }

        match sync.refresh().await {
            Ok(()) => {}
            Err(e) if sync.status().is_terminal() => {
                debug!(chat_id = %chat_id, error = %e, "thread closed while loading");
            }
            Err(e) => {
                screen.unmount();
                return Err(e);
            }
        }
        info!(chat_id = %chat_id, "thread mounted");
        Ok(screen)
    }

    async fn subscribe_all(&mut self) -> ClientResult<()> {
        let subscriber = self.sync.state.subscriber();
        let chat = self.sync.chat_id;

        let sync = self.sync.clone();
        self.subscriptions.push(
            subscriber
                .subscribe_typed::<Message, _>(
                    Topic::new(Table::Messages, Filter::ChatId(chat)),
                    move |e| sync.on_message(e),
                )
                .await?,
        );

        let sync = self.sync.clone();
        self.subscriptions.push(
            subscriber
                .subscribe_typed::<Reaction, _>(
                    Topic::new(Table::Reactions, Filter::ChatId(chat)),
                    move |e| sync.on_reaction(e),
                )
                .await?,
        );

        let sync = self.sync.clone();
        self.subscriptions.push(
            subscriber
                .subscribe_typed::<Chat, _>(Topic::new(Table::Chats, Filter::Id(chat.as_uuid())), move |e| {
                    sync.on_chat(e)
                })
                .await?,
        );

        let sync = self.sync.clone();
        self.subscriptions.push(
            subscriber
                .subscribe_typed::<Participant, _>(
                    Topic::new(Table::ChatParticipants, Filter::ChatId(chat)),
                    move |e| sync.on_participant(e),
                )
                .await?,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn chat_id(&self) -> ChatId {
        self.sync.chat_id
    }

    pub fn status(&self) -> ThreadStatus {
        self.sync.status()
    }

    pub fn chat(&self) -> Option<Chat> {
        lock(&self.sync.chat).clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.sync.messages).to_vec()
    }

    pub fn is_pending(&self, id: &MessageId) -> bool {
        lock(&self.sync.messages).is_pending(id)
    }

    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.sync.participants)
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }

    pub fn display_name(&self, user: UserId) -> Option<String> {
        lock(&self.sync.names).get(&user).cloned()
    }

    /// Reaction summaries for the messages currently in view.
    pub fn reaction_summaries(&self) -> ReactionSummaries {
        let reactions = lock(&self.sync.reactions).to_vec();
        let names = lock(&self.sync.names).clone();
        let mut summaries = summarize(&reactions, self.sync.viewer, &names);
        let messages = lock(&self.sync.messages);
        summaries.retain(|message, _| messages.contains(message));
        summaries
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn send_text(&self, text: &str) -> ClientResult<Message> {
        self.send(text, None).await
    }

    /// Send a message. Rejected with `SendInProgress` while a previous send
    /// on this screen is still running.
    pub async fn send(&self, text: &str, attachment: Option<Attachment>) -> ClientResult<Message> {
        if self.sending.swap(true, Ordering::SeqCst) {
            return Err(ClientError::SendInProgress);
        }
        let _guard = SendingGuard(&self.sending);

        let state = &self.sync.state;
        let new = messaging::prepare_message(state, self.sync.chat_id, text, attachment.as_ref()).await?;

        let draft = Message {
            id: MessageId::new(),
            chat_id: self.sync.chat_id,
            sender_id: self.sync.viewer,
            content: new.content.clone(),
            content_type: new.content_type,
            media_url: new.media_url.clone(),
            created_at: Utc::now(),
        };
        let local_id = lock(&self.sync.messages).apply_optimistic(draft);
        self.sync.thread_changed();

        match state.services.store.send_message(self.sync.viewer, new).await {
            Ok(stored) => {
                if !self.sync.is_closed() {
                    lock(&self.sync.messages).confirm_optimistic(&local_id, stored.clone());
                    self.sync.thread_changed();
                }
                debug!(message_id = %stored.id, "message confirmed");
                Ok(stored)
            }
            Err(e) => {
                warn!(chat_id = %self.sync.chat_id, error = %e, "send failed, rolling back");
                lock(&self.sync.messages).revert_optimistic(&local_id);
                self.sync.thread_changed();
                if matches!(e, BackendError::NotFound(_)) {
                    self.sync.fail(&e);
                }
                Err(e.into())
            }
        }
    }

    /// Toggle the viewer's `emoji` reaction on `message`.
    pub async fn toggle_reaction(&self, message: MessageId, emoji: &str) -> ClientResult<ToggleOutcome> {
        let outcome = self.toggler.toggle(self.sync.viewer, message, emoji).await?;
        if self.sync.is_closed() {
            return Ok(outcome);
        }
        let applied = match &outcome {
            ToggleOutcome::Added(row) => lock(&self.sync.reactions).apply_change(ChangeEvent::insert(row.clone())),
            ToggleOutcome::Removed(row) => lock(&self.sync.reactions).apply_change(ChangeEvent::delete(row.clone())),
            ToggleOutcome::Unchanged | ToggleOutcome::InFlight => false,
        };
        if applied {
            self.sync.reactions_changed();
        }
        Ok(outcome)
    }

    pub async fn delete_message(&self, id: MessageId) -> ClientResult<()> {
        messaging::delete_message(&self.sync.state, id).await?;
        let mut messages = lock(&self.sync.messages);
        if let Some(row) = messages.get(&id).cloned() {
            if messages.apply_change(ChangeEvent::delete(row)) {
                drop(messages);
                self.sync.thread_changed();
            }
        }
        Ok(())
    }

    /// Leave the chat and close the screen.
    pub async fn leave(&mut self) -> ClientResult<()> {
        crate::commands::chats::leave_chat(&self.sync.state, self.sync.chat_id).await?;
        self.unmount();
        Ok(())
    }

    pub async fn refresh(&self) -> ClientResult<()> {
        self.sync.refresh().await
    }

    /// Close every subscription. No event reaches the views afterwards.
    pub fn unmount(&mut self) {
        if self.sync.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for subscription in &mut self.subscriptions {
            subscription.close();
        }
        self.subscriptions.clear();
        self.sync.state.clear_open_chat(self.sync.chat_id);
        debug!(chat_id = %self.sync.chat_id, "thread unmounted");
    }
}

impl Drop for ThreadScreen {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::commands::chats::{create_chat, delete_chat};
    use crate::commands::messaging::send_message;
    use crate::fixtures::{backend, device, eventually};

    fn contents(screen: &ThreadScreen) -> Vec<String> {
        screen.messages().into_iter().map(|m| m.content).collect()
    }

    #[tokio::test]
    async fn optimistic_send_settles_to_one_entry() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();

        let screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();
        assert_eq!(screen.status(), ThreadStatus::Ready);
        assert!(screen.messages().is_empty());
        assert_eq!(ada.open_chat(), Some(chat.id));

        let stored = screen.send_text("hi").await.unwrap();
        assert!(!screen.is_pending(&stored.id));

        // Let the echo arrive; it must not duplicate the entry.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(contents(&screen), vec!["hi"]);
        assert_eq!(screen.messages()[0].id, stored.id);
    }

    #[tokio::test]
    async fn second_send_is_rejected_while_first_runs() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();
        let screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();
        backend.set_latency(Duration::from_millis(30));

        let (first, second) = tokio::join!(screen.send_text("one"), screen.send_text("two"));
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), ClientError::SendInProgress);
        assert!(!screen.is_sending());
        assert_eq!(contents(&screen), vec!["one"]);
    }

    #[tokio::test]
    async fn echo_arriving_before_send_returns_is_not_doubled() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();
        let screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();
        // The change event is published well before the sender hears back.
        backend.set_reply_delay(Duration::from_millis(60));

        let watch = async {
            let mut most = 0;
            for _ in 0..30 {
                tokio::time::sleep(Duration::from_millis(3)).await;
                let shown = contents(&screen).iter().filter(|c| *c == "hi").count();
                most = most.max(shown);
            }
            most
        };
        let (stored, most) = tokio::join!(screen.send_text("hi"), watch);
        let stored = stored.unwrap();
        assert_eq!(most, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(contents(&screen), vec!["hi"]);
        assert_eq!(screen.messages()[0].id, stored.id);
        assert!(!screen.is_pending(&stored.id));
    }

    #[tokio::test]
    async fn overlapping_resyncs_keep_live_messages() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();
        send_message(&ada, chat.id, "first", None).await.unwrap();
        let screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();

        backend.disconnect_subscribers();
        tokio::time::sleep(Duration::from_millis(15)).await;
        backend.disconnect_subscribers();
        send_message(&ada, chat.id, "second", None).await.unwrap();
        backend.disconnect_subscribers();
        send_message(&ada, chat.id, "third", None).await.unwrap();

        eventually(|| contents(&screen) == ["first", "second", "third"]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(contents(&screen), vec!["first", "second", "third"]);
        assert_eq!(screen.status(), ThreadStatus::Ready);
    }

    #[tokio::test]
    async fn failed_send_rolls_back() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();
        let screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();

        backend.set_offline(true);
        let err = screen.send_text("lost?").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(screen.messages().is_empty());
        backend.set_offline(false);
    }

    #[tokio::test]
    async fn remote_messages_and_reactions_arrive() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let bob = device(&backend, "bob").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();

        let ada_screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();
        let bob_screen = ThreadScreen::mount(bob.clone(), chat.id).await.unwrap();
        eventually(|| ada_screen.participants().len() == 2).await;

        let message = bob_screen.send_text("hello").await.unwrap();
        eventually(|| contents(&ada_screen) == ["hello"]).await;

        bob_screen.toggle_reaction(message.id, "👍").await.unwrap();
        ada_screen.toggle_reaction(message.id, "👍").await.unwrap();
        ada_screen.toggle_reaction(message.id, "❤️").await.unwrap();

        eventually(|| {
            let summaries = ada_screen.reaction_summaries();
            summaries
                .get(&message.id)
                .map(|list| list.len() == 2 && list[0].count == 2)
                .unwrap_or(false)
        })
        .await;
        let summaries = ada_screen.reaction_summaries();
        let list = &summaries[&message.id];
        assert_eq!(list[0].emoji, "👍");
        assert!(list[0].viewer_has_reacted);
        assert_eq!(list[1].emoji, "❤️");
        assert_eq!(list[1].count, 1);
        assert!(list[1].viewer_has_reacted);

        eventually(|| {
            bob_screen
                .reaction_summaries()
                .get(&message.id)
                .map(|list| list.len() == 2 && !list[1].viewer_has_reacted)
                .unwrap_or(false)
        })
        .await;
    }

    #[tokio::test]
    async fn deletion_makes_the_thread_terminal() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let bob = device(&backend, "bob").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();

        let bob_screen = ThreadScreen::mount(bob.clone(), chat.id).await.unwrap();
        delete_chat(&ada, chat.id).await.unwrap();
        eventually(|| bob_screen.status() == ThreadStatus::ChatDeleted).await;

        // Reopening a deleted chat lands in the same state.
        let reopened = ThreadScreen::mount(bob.clone(), chat.id).await.unwrap();
        assert_eq!(reopened.status(), ThreadStatus::ChatDeleted);
    }

    #[tokio::test]
    async fn late_events_after_unmount_change_nothing() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();

        let mut screen = ThreadScreen::mount(ada.clone(), chat.id).await.unwrap();
        screen.unmount();
        assert_eq!(ada.open_chat(), None);

        send_message(&ada, chat.id, "after", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(screen.messages().is_empty());
    }
}
