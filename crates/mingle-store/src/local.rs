//! Reference backend running entirely in-process.
//!
//! [`LocalBackend`] implements every collaborator trait on top of the
//! SQLite [`Database`], the [`ChangeFeed`] and the filesystem
//! [`ObjectStore`]. It enforces the row-level rules the hosted backend
//! applies and publishes one change event per affected row after each
//! successful write.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mingle_shared::constants::EMOJI_LIST;
use mingle_shared::invite::is_valid_email;
use mingle_shared::protocol::{ChangeEvent, Topic};
use mingle_shared::types::{ChatId, InvitationId, MessageId, ReactionId, UserId};
use mingle_shared::{BackendError, BackendResult};

use crate::backend::{AuthProvider, ChangeStream, DataStore, ObjectStorage, Realtime, ServiceStore};
use crate::credentials::{hash_password, verify_password, Credential};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::feed::ChangeFeed;
use crate::models::{
    AuthSession, Change, Chat, ChatSettings, Invitation, InvitationStatus, Message, NewChat,
    NewMessage, Participant, ParticipantRole, ProfilePatch, PushToken, Reaction, Record, User,
};
use crate::objects::{ObjectStore, PutOutcome};

const MIN_PASSWORD_LEN: usize = 6;

async fn pause(ms: &AtomicU64) {
    let ms = ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

pub struct LocalBackend {
    db: Mutex<Database>,
    feed: ChangeFeed,
    objects: ObjectStore,
    session: Mutex<Option<AuthSession>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
    reply_delay_ms: AtomicU64,
}

impl LocalBackend {
    pub fn new(db: Database, objects: ObjectStore) -> Self {
        Self {
            db: Mutex::new(db),
            feed: ChangeFeed::default(),
            objects,
            session: Mutex::new(None),
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            reply_delay_ms: AtomicU64::new(0),
        }
    }

    /// In-memory database with objects under a fresh temp directory.
    pub fn in_memory() -> Result<Self> {
        let root = std::env::temp_dir().join(format!("mingle-objects-{}", uuid::Uuid::new_v4()));
        Ok(Self::new(Database::open_in_memory()?, ObjectStore::new(root)))
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// While offline every call fails with `Transient`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        tracing::info!(offline, "local backend connectivity changed");
    }

    /// Delay applied before message and reaction calls.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay between storing a message (and publishing its change event)
    /// and answering the sender.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.reply_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn round_trip(&self) {
        pause(&self.latency_ms).await;
    }

    /// End every open change stream.
    pub fn disconnect_subscribers(&self) {
        self.feed.reset();
    }

    fn check_online(&self) -> BackendResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Transient("backend unreachable".into()));
        }
        Ok(())
    }

    /// Run a closure against the database. The guard never outlives the
    /// closure, so no lock is held across an await.
    fn with_db<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> BackendResult<T> {
        self.check_online()?;
        let mut db = self
            .db
            .lock()
            .map_err(|_| BackendError::Transient("database lock poisoned".into()))?;
        f(&mut db).map_err(BackendError::from)
    }

    /// Like [`Self::with_db`], then publish the changes the write produced.
    fn write<T>(&self, f: impl FnOnce(&mut Database) -> Result<(T, Vec<Change>)>) -> BackendResult<T> {
        let (value, changes) = self.with_db(f)?;
        for change in changes {
            self.feed.publish(change);
        }
        Ok(value)
    }

    fn set_session(&self, session: Option<AuthSession>) -> BackendResult<()> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| BackendError::Transient("session lock poisoned".into()))?;
        *slot = session;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Access rules
// ---------------------------------------------------------------------------

fn active_membership(db: &Database, chat: ChatId, user: UserId) -> Result<Participant> {
    match db.find_participant(chat, user)? {
        Some(p) if p.is_active() => Ok(p),
        _ => Err(StoreError::AccessDenied),
    }
}

/// Creator or active participant.
fn ensure_member_or_creator(db: &Database, chat: &Chat, user: UserId) -> Result<()> {
    if chat.created_by == user {
        return Ok(());
    }
    active_membership(db, chat.id, user).map(|_| ())
}

fn ensure_admin(db: &Database, chat: ChatId, user: UserId) -> Result<Participant> {
    let membership = active_membership(db, chat, user)?;
    if !membership.role.is_admin() {
        return Err(StoreError::AccessDenied);
    }
    Ok(membership)
}

fn change(kind: fn(Record) -> Change, row: impl Into<Record>) -> Change {
    kind(row.into())
}

// ---------------------------------------------------------------------------
// DataStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DataStore for LocalBackend {
    async fn ensure_user(&self, session: &AuthSession) -> BackendResult<User> {
        let session = session.clone();
        self.write(move |db| {
            if let Some(user) = db.find_user(session.user_id)? {
                return Ok((user, Vec::new()));
            }
            let user = User {
                id: session.user_id,
                email: session.email,
                display_name: session.display_name,
                avatar_url: None,
                online_at: None,
                created_at: Utc::now(),
            };
            db.insert_user(&user)?;
            tracing::info!(user_id = %user.id, "profile created");
            Ok((user.clone(), vec![change(ChangeEvent::insert, user)]))
        })
    }

    async fn get_user(&self, id: UserId) -> BackendResult<User> {
        self.with_db(|db| db.get_user(id))
    }

    async fn get_users(&self, ids: &[UserId]) -> BackendResult<Vec<User>> {
        self.with_db(|db| db.get_users(ids))
    }

    async fn update_profile(&self, actor: UserId, patch: ProfilePatch) -> BackendResult<User> {
        if let Some(name) = &patch.display_name {
            if name.trim().is_empty() {
                return Err(BackendError::Invalid("display name cannot be empty".into()));
            }
        }
        self.write(|db| {
            let user = db.update_user_profile(actor, &patch)?;
            Ok((user.clone(), vec![change(ChangeEvent::update, user)]))
        })
    }

    async fn report_presence(&self, actor: UserId, at: DateTime<Utc>) -> BackendResult<User> {
        self.write(|db| {
            let user = db.set_user_online_at(actor, at)?;
            Ok((user.clone(), vec![change(ChangeEvent::update, user)]))
        })
    }

    async fn chats_created_by(&self, actor: UserId) -> BackendResult<Vec<Chat>> {
        self.with_db(|db| db.list_chats_created_by(actor))
    }

    async fn chats_participating(&self, actor: UserId) -> BackendResult<Vec<Chat>> {
        self.with_db(|db| db.list_chats_participating(actor))
    }

    async fn get_chat(&self, _actor: UserId, id: ChatId) -> BackendResult<Chat> {
        // Chat rows are readable by any signed-in user so invite pages can
        // show the name before joining.
        self.with_db(|db| db.get_chat(id))
    }

    async fn create_chat(&self, actor: UserId, new: NewChat) -> BackendResult<Chat> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(BackendError::Invalid("chat name cannot be empty".into()));
        }
        self.write(move |db| {
            let now = Utc::now();
            let chat = Chat {
                id: ChatId::new(),
                name,
                is_group: new.is_group,
                created_by: actor,
                settings: ChatSettings::default(),
                created_at: now,
            };
            let owner = Participant {
                chat_id: chat.id,
                user_id: actor,
                role: ParticipantRole::Owner,
                joined_at: now,
                left_at: None,
            };

            let tx = db.conn().unchecked_transaction()?;
            db.insert_chat(&chat)?;
            db.insert_participant(&owner)?;
            tx.commit()?;

            tracing::info!(chat_id = %chat.id, created_by = %actor, "chat created");
            Ok((
                chat.clone(),
                vec![
                    change(ChangeEvent::insert, chat),
                    change(ChangeEvent::insert, owner),
                ],
            ))
        })
    }

    async fn update_chat_settings(
        &self,
        actor: UserId,
        id: ChatId,
        settings: ChatSettings,
    ) -> BackendResult<Chat> {
        self.write(move |db| {
            let chat = db.get_chat(id)?;
            let membership = active_membership(db, id, actor)?;
            if chat.settings.only_admins_can_edit_settings && !membership.role.is_admin() {
                return Err(StoreError::AccessDenied);
            }
            let updated = db.update_chat_settings(id, &settings)?;
            Ok((updated.clone(), vec![change(ChangeEvent::update, updated)]))
        })
    }

    async fn delete_chat(&self, actor: UserId, id: ChatId) -> BackendResult<()> {
        self.write(move |db| {
            let chat = db.get_chat(id)?;
            if chat.created_by != actor {
                return Err(StoreError::AccessDenied);
            }
            let participants = db.list_participants(id)?;
            db.delete_chat(id)?;

            tracing::info!(chat_id = %id, "chat deleted");
            let mut changes = vec![change(ChangeEvent::delete, chat)];
            changes.extend(
                participants
                    .into_iter()
                    .map(|p| change(ChangeEvent::delete, p)),
            );
            Ok(((), changes))
        })
    }

    async fn list_participants(&self, actor: UserId, chat: ChatId) -> BackendResult<Vec<Participant>> {
        self.with_db(|db| {
            let row = db.get_chat(chat)?;
            ensure_member_or_creator(db, &row, actor)?;
            db.list_participants(chat)
        })
    }

    async fn join_chat(&self, actor: UserId, chat: ChatId) -> BackendResult<Participant> {
        self.write(move |db| {
            let row = db.get_chat(chat)?;
            let existing = db.find_participant(chat, actor)?;
            if let Some(p) = &existing {
                if p.is_active() {
                    return Ok((p.clone(), Vec::new()));
                }
            }

            let participant = Participant {
                chat_id: chat,
                user_id: actor,
                role: if row.created_by == actor {
                    ParticipantRole::Owner
                } else {
                    ParticipantRole::Member
                },
                joined_at: Utc::now(),
                left_at: None,
            };
            db.upsert_participant(&participant)?;
            tracing::debug!(chat_id = %chat, user_id = %actor, rejoin = existing.is_some(), "joined chat");

            let event = if existing.is_some() {
                change(ChangeEvent::update, participant.clone())
            } else {
                change(ChangeEvent::insert, participant.clone())
            };
            Ok((participant, vec![event]))
        })
    }

    async fn add_member(&self, actor: UserId, chat: ChatId) -> BackendResult<Participant> {
        self.write(move |db| {
            db.get_chat(chat)?;
            let participant = Participant {
                chat_id: chat,
                user_id: actor,
                role: ParticipantRole::Member,
                joined_at: Utc::now(),
                left_at: None,
            };
            db.insert_participant(&participant)?;
            Ok((
                participant.clone(),
                vec![change(ChangeEvent::insert, participant)],
            ))
        })
    }

    async fn leave_chat(&self, actor: UserId, chat: ChatId) -> BackendResult<Participant> {
        self.write(move |db| {
            let left = db.set_participant_left(chat, actor, Utc::now())?;
            tracing::debug!(chat_id = %chat, user_id = %actor, "left chat");
            Ok((left.clone(), vec![change(ChangeEvent::update, left)]))
        })
    }

    async fn set_role(
        &self,
        actor: UserId,
        chat: ChatId,
        user: UserId,
        role: ParticipantRole,
    ) -> BackendResult<Participant> {
        self.write(move |db| {
            let membership = active_membership(db, chat, actor)?;
            if membership.role != ParticipantRole::Owner {
                return Err(StoreError::AccessDenied);
            }
            let updated = db.set_participant_role(chat, user, role)?;
            Ok((updated.clone(), vec![change(ChangeEvent::update, updated)]))
        })
    }

    async fn remove_participant(&self, actor: UserId, chat: ChatId, user: UserId) -> BackendResult<()> {
        self.write(move |db| {
            let row = db.get_chat(chat)?;
            ensure_admin(db, chat, actor)?;
            if row.created_by == user {
                return Err(StoreError::AccessDenied);
            }
            let removed = db.delete_participant(chat, user)?;
            Ok(((), vec![change(ChangeEvent::delete, removed)]))
        })
    }

    async fn list_messages(&self, actor: UserId, chat: ChatId) -> BackendResult<Vec<Message>> {
        self.with_db(|db| {
            db.get_chat(chat)?;
            active_membership(db, chat, actor)?;
            db.get_messages_for_chat(chat)
        })
    }

    async fn send_message(&self, actor: UserId, new: NewMessage) -> BackendResult<Message> {
        let content = new.content.trim().to_string();
        if content.is_empty() && new.media_url.is_none() {
            return Err(BackendError::Invalid(
                "a message needs text or an attachment".into(),
            ));
        }
        self.round_trip().await;
        let stored = self.write(move |db| {
            db.get_chat(new.chat_id)?;
            active_membership(db, new.chat_id, actor)?;
            let message = Message {
                id: MessageId::new(),
                chat_id: new.chat_id,
                sender_id: actor,
                content,
                content_type: new.content_type,
                media_url: new.media_url,
                created_at: Utc::now(),
            };
            db.insert_message(&message)?;
            tracing::debug!(message_id = %message.id, chat_id = %message.chat_id, "message stored");
            Ok((message.clone(), vec![change(ChangeEvent::insert, message)]))
        })?;
        pause(&self.reply_delay_ms).await;
        Ok(stored)
    }

    async fn delete_message(&self, actor: UserId, id: MessageId) -> BackendResult<()> {
        self.write(move |db| {
            let message = db.get_message_by_id(id)?;
            if message.sender_id != actor {
                let chat = db.get_chat(message.chat_id)?;
                let membership = active_membership(db, message.chat_id, actor)?;
                if !(chat.settings.only_admins_can_remove_messages && membership.role.is_admin()) {
                    return Err(StoreError::AccessDenied);
                }
            }
            let reactions = db.get_reactions_for_message(id)?;
            db.delete_message(id)?;

            let mut changes: Vec<Change> = reactions
                .into_iter()
                .map(|r| change(ChangeEvent::delete, r))
                .collect();
            changes.push(change(ChangeEvent::delete, message));
            Ok(((), changes))
        })
    }

    async fn list_reactions(
        &self,
        actor: UserId,
        chat: ChatId,
        messages: &[MessageId],
    ) -> BackendResult<Vec<Reaction>> {
        self.with_db(|db| {
            db.get_chat(chat)?;
            active_membership(db, chat, actor)?;
            Ok(db
                .get_reactions_for_messages(messages)?
                .into_iter()
                .filter(|r| r.chat_id == chat)
                .collect())
        })
    }

    async fn find_reaction(
        &self,
        actor: UserId,
        message: MessageId,
        emoji: &str,
    ) -> BackendResult<Option<Reaction>> {
        self.round_trip().await;
        self.with_db(|db| db.find_reaction(message, actor, emoji))
    }

    async fn add_reaction(&self, actor: UserId, message: MessageId, emoji: &str) -> BackendResult<Reaction> {
        if !EMOJI_LIST.contains(&emoji) {
            return Err(BackendError::Invalid(format!("unsupported emoji '{emoji}'")));
        }
        let emoji = emoji.to_string();
        self.round_trip().await;
        self.write(move |db| {
            let target = db.get_message_by_id(message)?;
            active_membership(db, target.chat_id, actor)?;
            let reaction = Reaction {
                id: ReactionId::new(),
                message_id: message,
                chat_id: target.chat_id,
                user_id: actor,
                emoji,
                created_at: Utc::now(),
            };
            db.insert_reaction(&reaction)?;
            Ok((reaction.clone(), vec![change(ChangeEvent::insert, reaction)]))
        })
    }

    async fn remove_reaction(
        &self,
        actor: UserId,
        message: MessageId,
        emoji: &str,
    ) -> BackendResult<Option<Reaction>> {
        self.round_trip().await;
        self.write(|db| {
            // Keyed by the actor, so only the author's own row can go.
            let removed = db.remove_reaction(message, actor, emoji)?;
            let changes: Vec<Change> = removed
                .iter()
                .cloned()
                .map(|r| change(ChangeEvent::delete, r))
                .collect();
            Ok((removed, changes))
        })
    }

    async fn create_invitations(
        &self,
        actor: UserId,
        chat: ChatId,
        emails: &[String],
    ) -> BackendResult<Vec<Invitation>> {
        let invalid: Vec<String> = emails
            .iter()
            .filter(|e| !is_valid_email(e))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(BackendError::Invalid(format!(
                "invalid email format: {}",
                invalid.join(", ")
            )));
        }

        self.write(|db| {
            let row = db.get_chat(chat)?;
            let membership = active_membership(db, chat, actor)?;
            if !row.settings.participants_can_invite && !membership.role.is_admin() {
                return Err(StoreError::AccessDenied);
            }

            let member_ids: Vec<UserId> = db
                .list_participants(chat)?
                .into_iter()
                .filter(Participant::is_active)
                .map(|p| p.user_id)
                .collect();
            let taken: HashSet<String> = db
                .get_users(&member_ids)?
                .into_iter()
                .map(|u| u.email.to_lowercase())
                .collect();

            let mut seen = HashSet::new();
            let now = Utc::now();
            let invitations: Vec<Invitation> = emails
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !taken.contains(e) && seen.insert(e.clone()))
                .map(|email| Invitation {
                    id: InvitationId::new(),
                    chat_id: chat,
                    inviter_id: actor,
                    invitee_email: email,
                    status: InvitationStatus::Pending,
                    created_at: now,
                })
                .collect();
            if invitations.is_empty() {
                return Err(StoreError::Invalid(
                    "every address already belongs to a participant".into(),
                ));
            }

            db.insert_invitations(&invitations)?;
            tracing::info!(chat_id = %chat, count = invitations.len(), "invitations created");
            let changes: Vec<Change> = invitations
                .iter()
                .cloned()
                .map(|i| change(ChangeEvent::insert, i))
                .collect();
            Ok((invitations, changes))
        })
    }

    async fn accept_invitations(&self, actor: UserId, chat: ChatId) -> BackendResult<Vec<Invitation>> {
        self.write(move |db| {
            let user = db.get_user(actor)?;
            let accepted = db.accept_invitations(chat, &user.email.to_lowercase())?;
            let changes: Vec<Change> = accepted
                .iter()
                .cloned()
                .map(|i| change(ChangeEvent::update, i))
                .collect();
            Ok((accepted, changes))
        })
    }

    async fn register_push_token(&self, actor: UserId, token: &str) -> BackendResult<()> {
        if token.trim().is_empty() {
            return Err(BackendError::Invalid("empty push token".into()));
        }
        self.with_db(|db| {
            db.upsert_push_token(&PushToken {
                user_id: actor,
                push_token: token.to_string(),
                created_at: Utc::now(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Service reads
// ---------------------------------------------------------------------------

#[async_trait]
impl ServiceStore for LocalBackend {
    async fn chat(&self, id: ChatId) -> BackendResult<Chat> {
        self.with_db(|db| db.get_chat(id))
    }

    async fn user(&self, id: UserId) -> BackendResult<User> {
        self.with_db(|db| db.get_user(id))
    }

    async fn participants(&self, chat: ChatId) -> BackendResult<Vec<Participant>> {
        self.with_db(|db| db.list_participants(chat))
    }

    async fn push_tokens(&self, users: &[UserId]) -> BackendResult<Vec<PushToken>> {
        self.with_db(|db| db.get_push_tokens(users))
    }
}

// ---------------------------------------------------------------------------
// Realtime / storage / auth
// ---------------------------------------------------------------------------

#[async_trait]
impl Realtime for LocalBackend {
    async fn subscribe(&self, topic: Topic) -> BackendResult<ChangeStream> {
        self.check_online()?;
        let receiver = self
            .feed
            .subscribe(topic)
            .ok_or_else(|| BackendError::Transient("change feed unavailable".into()))?;
        tracing::debug!(topic = %topic, "realtime subscription opened");
        Ok(receiver.into_stream())
    }
}

#[async_trait]
impl ObjectStorage for LocalBackend {
    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> BackendResult<String> {
        self.check_online()?;
        match self.objects.put(bucket, key, &bytes).await? {
            PutOutcome::Created => Ok(key.to_string()),
            PutOutcome::AlreadyExists => Err(BackendError::Conflict(format!("{bucket}/{key}"))),
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.objects.public_url(bucket, path)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> BackendResult<()> {
        self.check_online()?;
        self.objects.remove(bucket, paths).await?;
        Ok(())
    }
}

impl LocalBackend {
    /// Register credentials and return a fresh session for them.
    pub fn create_account(&self, email: &str, password: &str, display_name: &str) -> BackendResult<AuthSession> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(BackendError::Invalid(format!("invalid email format: {email}")));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(BackendError::Invalid(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };

        let session = self.with_db(|db| {
            let credential = Credential {
                user_id: UserId::new(),
                email: email.clone(),
                password_hash: hash_password(password)?,
                display_name: display_name.clone(),
                created_at: Utc::now(),
            };
            db.insert_credential(&credential)?;
            Ok(AuthSession {
                user_id: credential.user_id,
                email: credential.email,
                display_name: credential.display_name,
                issued_at: Utc::now(),
            })
        })?;

        tracing::info!(user_id = %session.user_id, "account created");
        Ok(session)
    }

    /// Check credentials. Unknown email and wrong password look the same.
    pub fn authenticate(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let email = email.trim().to_lowercase();
        let session = self.with_db(|db| {
            let credential = db
                .find_credential_by_email(&email)?
                .ok_or(StoreError::AccessDenied)?;
            if !verify_password(password, &credential.password_hash)? {
                return Err(StoreError::AccessDenied);
            }
            Ok(AuthSession {
                user_id: credential.user_id,
                email: credential.email,
                display_name: credential.display_name,
                issued_at: Utc::now(),
            })
        })?;

        tracing::info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    fn current_session(&self) -> BackendResult<Option<AuthSession>> {
        self.check_online()?;
        self.session
            .lock()
            .map(|s| s.clone())
            .map_err(|_| BackendError::Transient("session lock poisoned".into()))
    }
}

/// The backend's own session slot, for single-user setups.
#[async_trait]
impl AuthProvider for LocalBackend {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> BackendResult<AuthSession> {
        let session = self.create_account(email, password, display_name)?;
        self.set_session(Some(session.clone()))?;
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let session = self.authenticate(email, password)?;
        self.set_session(Some(session.clone()))?;
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.set_session(None)
    }

    async fn get_session(&self) -> BackendResult<Option<AuthSession>> {
        self.current_session()
    }
}

/// A separate signed-in device against a shared [`LocalBackend`]. Each
/// device keeps its own session while reading and writing the same store.
pub struct LocalSession {
    backend: Arc<LocalBackend>,
    session: Mutex<Option<AuthSession>>,
}

impl LocalSession {
    pub fn new(backend: Arc<LocalBackend>) -> Self {
        Self {
            backend,
            session: Mutex::new(None),
        }
    }

    fn set(&self, session: Option<AuthSession>) -> BackendResult<()> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| BackendError::Transient("session lock poisoned".into()))?;
        *slot = session;
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for LocalSession {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> BackendResult<AuthSession> {
        let session = self.backend.create_account(email, password, display_name)?;
        self.set(Some(session.clone()))?;
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let session = self.backend.authenticate(email, password)?;
        self.set(Some(session.clone()))?;
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.set(None)
    }

    async fn get_session(&self) -> BackendResult<Option<AuthSession>> {
        self.backend.check_online()?;
        self.session
            .lock()
            .map(|s| s.clone())
            .map_err(|_| BackendError::Transient("session lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use mingle_shared::protocol::{ChangeKind, Filter, Table};

    use super::*;
    use crate::models::ContentType;

    async fn account(backend: &LocalBackend, name: &str) -> User {
        let session = backend
            .sign_up(&format!("{name}@mingle.test"), "secret-pw", name)
            .await
            .unwrap();
        backend.ensure_user(&session).await.unwrap()
    }

    fn text(chat: ChatId, content: &str) -> NewMessage {
        NewMessage {
            chat_id: chat,
            content: content.into(),
            content_type: ContentType::Text,
            media_url: None,
        }
    }

    fn team() -> NewChat {
        NewChat {
            name: "Team".into(),
            is_group: true,
        }
    }

    #[tokio::test]
    async fn create_chat_makes_owner_and_publishes() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let mut stream = backend
            .subscribe(Topic::new(Table::Chats, Filter::All))
            .await
            .unwrap();

        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        let participants = backend.list_participants(ada.id, chat.id).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].role, ParticipantRole::Owner);

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.entity, Record::Chat(chat));
    }

    #[tokio::test]
    async fn outsiders_are_denied_and_deleted_chats_are_not_found() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let bob = account(&backend, "bob").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();

        assert_eq!(
            backend.list_messages(bob.id, chat.id).await,
            Err(BackendError::AccessDenied)
        );
        assert_eq!(
            backend.delete_chat(bob.id, chat.id).await,
            Err(BackendError::AccessDenied)
        );

        backend.delete_chat(ada.id, chat.id).await.unwrap();
        assert!(matches!(
            backend.list_messages(ada.id, chat.id).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn join_leave_rejoin() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let bob = account(&backend, "bob").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();

        let joined = backend.join_chat(bob.id, chat.id).await.unwrap();
        assert_eq!(joined.role, ParticipantRole::Member);
        assert!(matches!(
            backend.add_member(bob.id, chat.id).await,
            Err(BackendError::Conflict(_))
        ));

        backend.leave_chat(bob.id, chat.id).await.unwrap();
        assert!(backend.chats_participating(bob.id).await.unwrap().is_empty());
        assert_eq!(
            backend.send_message(bob.id, text(chat.id, "hi")).await,
            Err(BackendError::AccessDenied)
        );

        backend.join_chat(bob.id, chat.id).await.unwrap();
        assert_eq!(backend.chats_participating(bob.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn message_needs_content() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();

        assert!(matches!(
            backend.send_message(ada.id, text(chat.id, "   ")).await,
            Err(BackendError::Invalid(_))
        ));
        let sent = backend.send_message(ada.id, text(chat.id, " hi ")).await.unwrap();
        assert_eq!(sent.content, "hi");
        assert_eq!(sent.sender_id, ada.id);
    }

    #[tokio::test]
    async fn message_event_precedes_delayed_reply() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        let mut stream = backend
            .subscribe(Topic::new(Table::Messages, Filter::ChatId(chat.id)))
            .await
            .unwrap();
        backend.set_reply_delay(Duration::from_millis(50));

        let send = backend.send_message(ada.id, text(chat.id, "hi"));
        tokio::pin!(send);
        let event = tokio::select! {
            event = stream.next() => event.unwrap().unwrap(),
            _ = &mut send => panic!("reply arrived before the change event"),
        };
        let stored = send.await.unwrap();
        assert_eq!(event.entity, Record::Message(stored));
    }

    #[tokio::test]
    async fn message_removal_rules() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let bob = account(&backend, "bob").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        backend.join_chat(bob.id, chat.id).await.unwrap();

        let from_bob = backend.send_message(bob.id, text(chat.id, "x")).await.unwrap();
        // Admin removal is off by default.
        assert_eq!(
            backend.delete_message(ada.id, from_bob.id).await,
            Err(BackendError::AccessDenied)
        );

        let settings = ChatSettings {
            only_admins_can_remove_messages: true,
            ..ChatSettings::default()
        };
        backend.update_chat_settings(ada.id, chat.id, settings).await.unwrap();
        backend.delete_message(ada.id, from_bob.id).await.unwrap();

        let from_ada = backend.send_message(ada.id, text(chat.id, "y")).await.unwrap();
        assert_eq!(
            backend.delete_message(bob.id, from_ada.id).await,
            Err(BackendError::AccessDenied)
        );
        backend.delete_message(ada.id, from_ada.id).await.unwrap();
    }

    #[tokio::test]
    async fn settings_respect_admin_flag() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let bob = account(&backend, "bob").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        backend.join_chat(bob.id, chat.id).await.unwrap();

        let open = ChatSettings {
            only_admins_can_edit_settings: false,
            ..ChatSettings::default()
        };
        assert_eq!(
            backend.update_chat_settings(bob.id, chat.id, open.clone()).await,
            Err(BackendError::AccessDenied)
        );
        backend.update_chat_settings(ada.id, chat.id, open.clone()).await.unwrap();
        let edited = backend.update_chat_settings(bob.id, chat.id, open).await.unwrap();
        assert!(!edited.settings.only_admins_can_edit_settings);
    }

    #[tokio::test]
    async fn roles_only_change_by_owner() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let bob = account(&backend, "bob").await;
        let cy = account(&backend, "cy").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        backend.join_chat(bob.id, chat.id).await.unwrap();
        backend.join_chat(cy.id, chat.id).await.unwrap();

        backend
            .set_role(ada.id, chat.id, bob.id, ParticipantRole::Admin)
            .await
            .unwrap();
        assert_eq!(
            backend.set_role(bob.id, chat.id, cy.id, ParticipantRole::Admin).await,
            Err(BackendError::AccessDenied)
        );
        // Admins may remove, but never the creator.
        backend.remove_participant(bob.id, chat.id, cy.id).await.unwrap();
        assert_eq!(
            backend.remove_participant(bob.id, chat.id, ada.id).await,
            Err(BackendError::AccessDenied)
        );
    }

    #[tokio::test]
    async fn duplicate_reaction_conflicts() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        let message = backend.send_message(ada.id, text(chat.id, "hi")).await.unwrap();

        backend.add_reaction(ada.id, message.id, "👍").await.unwrap();
        assert!(matches!(
            backend.add_reaction(ada.id, message.id, "👍").await,
            Err(BackendError::Conflict(_))
        ));
        assert!(matches!(
            backend.add_reaction(ada.id, message.id, "🦀").await,
            Err(BackendError::Invalid(_))
        ));
        assert!(backend.remove_reaction(ada.id, message.id, "👍").await.unwrap().is_some());
        assert!(backend.remove_reaction(ada.id, message.id, "👍").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invitations_skip_existing_participants() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();

        let emails = vec!["ada@mingle.test".to_string(), "New@X.io".to_string()];
        let invitations = backend.create_invitations(ada.id, chat.id, &emails).await.unwrap();
        assert_eq!(invitations.len(), 1);
        assert_eq!(invitations[0].invitee_email, "new@x.io");

        assert!(matches!(
            backend
                .create_invitations(ada.id, chat.id, &["ada@mingle.test".to_string()])
                .await,
            Err(BackendError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn accepting_marks_pending_invites() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        let chat = backend.create_chat(ada.id, team()).await.unwrap();
        backend
            .create_invitations(ada.id, chat.id, &["bob@mingle.test".to_string()])
            .await
            .unwrap();

        let bob = account(&backend, "bob").await;
        let accepted = backend.accept_invitations(bob.id, chat.id).await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].status, InvitationStatus::Accepted);
    }

    #[tokio::test]
    async fn offline_is_transient() {
        let backend = LocalBackend::in_memory().unwrap();
        let ada = account(&backend, "ada").await;
        backend.set_offline(true);
        let err = backend.chats_created_by(ada.id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(backend
            .subscribe(Topic::new(Table::Chats, Filter::All))
            .await
            .is_err());
        backend.set_offline(false);
        assert!(backend.chats_created_by(ada.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_round_trip() {
        let backend = LocalBackend::in_memory().unwrap();
        let session = backend.sign_up("Ada@Mingle.test", "secret-pw", "Ada").await.unwrap();
        assert_eq!(session.email, "ada@mingle.test");
        assert!(matches!(
            backend.sign_up("ada@mingle.test", "secret-pw", "Ada").await,
            Err(BackendError::Conflict(_))
        ));

        backend.sign_out().await.unwrap();
        assert!(backend.get_session().await.unwrap().is_none());
        assert_eq!(
            backend.sign_in("ada@mingle.test", "wrong-pw").await,
            Err(BackendError::AccessDenied)
        );
        let again = backend.sign_in("ada@mingle.test", "secret-pw").await.unwrap();
        assert_eq!(again.user_id, session.user_id);
        assert_eq!(backend.get_session().await.unwrap().unwrap().user_id, session.user_id);
    }

    #[tokio::test]
    async fn devices_keep_separate_sessions() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let phone = LocalSession::new(backend.clone());
        let laptop = LocalSession::new(backend.clone());

        let ada = phone.sign_up("ada@mingle.test", "secret-pw", "Ada").await.unwrap();
        let bob = laptop.sign_up("bob@mingle.test", "secret-pw", "Bob").await.unwrap();

        assert_eq!(phone.get_session().await.unwrap().unwrap().user_id, ada.user_id);
        assert_eq!(laptop.get_session().await.unwrap().unwrap().user_id, bob.user_id);

        phone.sign_out().await.unwrap();
        assert!(phone.get_session().await.unwrap().is_none());
        assert!(laptop.get_session().await.unwrap().is_some());
        assert!(backend.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_twice_conflicts() {
        let backend = LocalBackend::in_memory().unwrap();
        let path = backend.upload("avatars", "u/a.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(path, "u/a.png");
        assert!(matches!(
            backend.upload("avatars", "u/a.png", vec![1, 2, 3]).await,
            Err(BackendError::Conflict(_))
        ));
        backend.remove("avatars", &[path]).await.unwrap();
        let _ = std::fs::remove_dir_all(backend.objects().root());
    }
}
