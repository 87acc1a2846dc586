//! Collaborator interfaces of the client core.
//!
//! The client never talks to a concrete backend. It holds these traits as
//! `Arc<dyn ...>` so the hosted service, the local reference backend or a
//! test double can be swapped freely. Every call that acts on behalf of a
//! user takes that user's id as `actor`; ownership checks key on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mingle_shared::protocol::Topic;
use mingle_shared::types::{ChatId, MessageId, UserId};
use mingle_shared::BackendResult;

use crate::models::{
    AuthSession, Change, Chat, ChatSettings, Invitation, Message, NewChat, NewMessage,
    Participant, ParticipantRole, ProfilePatch, PushToken, Reaction, User,
};

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DataStore: Send + Sync {
    // --- users ---

    /// Create the profile row for a signed-in identity if it does not exist.
    async fn ensure_user(&self, session: &AuthSession) -> BackendResult<User>;
    async fn get_user(&self, id: UserId) -> BackendResult<User>;
    /// Unknown ids are skipped.
    async fn get_users(&self, ids: &[UserId]) -> BackendResult<Vec<User>>;
    async fn update_profile(&self, actor: UserId, patch: ProfilePatch) -> BackendResult<User>;
    /// Write the actor's presence heartbeat.
    async fn report_presence(&self, actor: UserId, at: DateTime<Utc>) -> BackendResult<User>;

    // --- chats ---

    async fn chats_created_by(&self, actor: UserId) -> BackendResult<Vec<Chat>>;
    async fn chats_participating(&self, actor: UserId) -> BackendResult<Vec<Chat>>;
    async fn get_chat(&self, actor: UserId, id: ChatId) -> BackendResult<Chat>;
    /// Creates the chat and the actor's `owner` participant row.
    async fn create_chat(&self, actor: UserId, chat: NewChat) -> BackendResult<Chat>;
    async fn update_chat_settings(
        &self,
        actor: UserId,
        id: ChatId,
        settings: ChatSettings,
    ) -> BackendResult<Chat>;
    async fn delete_chat(&self, actor: UserId, id: ChatId) -> BackendResult<()>;

    // --- participants ---

    async fn list_participants(&self, actor: UserId, chat: ChatId) -> BackendResult<Vec<Participant>>;
    /// Upsert the actor as participant, clearing `left_at`.
    async fn join_chat(&self, actor: UserId, chat: ChatId) -> BackendResult<Participant>;
    /// Plain insert of the actor as `member`; `Conflict` if a row exists.
    async fn add_member(&self, actor: UserId, chat: ChatId) -> BackendResult<Participant>;
    async fn leave_chat(&self, actor: UserId, chat: ChatId) -> BackendResult<Participant>;
    async fn set_role(
        &self,
        actor: UserId,
        chat: ChatId,
        user: UserId,
        role: ParticipantRole,
    ) -> BackendResult<Participant>;
    async fn remove_participant(&self, actor: UserId, chat: ChatId, user: UserId) -> BackendResult<()>;

    // --- messages ---

    /// Oldest first.
    async fn list_messages(&self, actor: UserId, chat: ChatId) -> BackendResult<Vec<Message>>;
    /// Returns the stored row with its server-assigned id and timestamp.
    async fn send_message(&self, actor: UserId, message: NewMessage) -> BackendResult<Message>;
    async fn delete_message(&self, actor: UserId, id: MessageId) -> BackendResult<()>;

    // --- reactions ---

    async fn list_reactions(
        &self,
        actor: UserId,
        chat: ChatId,
        messages: &[MessageId],
    ) -> BackendResult<Vec<Reaction>>;
    async fn find_reaction(
        &self,
        actor: UserId,
        message: MessageId,
        emoji: &str,
    ) -> BackendResult<Option<Reaction>>;
    /// `Conflict` if the actor already reacted with this emoji.
    async fn add_reaction(&self, actor: UserId, message: MessageId, emoji: &str) -> BackendResult<Reaction>;
    /// Returns the deleted row, `None` if there was nothing to delete.
    async fn remove_reaction(
        &self,
        actor: UserId,
        message: MessageId,
        emoji: &str,
    ) -> BackendResult<Option<Reaction>>;

    // --- invitations / push ---

    async fn create_invitations(
        &self,
        actor: UserId,
        chat: ChatId,
        emails: &[String],
    ) -> BackendResult<Vec<Invitation>>;
    /// Mark the actor's pending invitations to `chat` as accepted.
    async fn accept_invitations(&self, actor: UserId, chat: ChatId) -> BackendResult<Vec<Invitation>>;
    /// One token per user; registering again replaces it.
    async fn register_push_token(&self, actor: UserId, token: &str) -> BackendResult<()>;
}

/// Privileged reads used by server-side triggers. Not subject to the
/// per-user access rules of [`DataStore`].
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn chat(&self, id: ChatId) -> BackendResult<Chat>;
    async fn user(&self, id: UserId) -> BackendResult<User>;
    /// Every participant row of `chat`, including members who left.
    async fn participants(&self, chat: ChatId) -> BackendResult<Vec<Participant>>;
    async fn push_tokens(&self, users: &[UserId]) -> BackendResult<Vec<PushToken>>;
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The reader fell behind and `n` events were dropped.
    #[error("subscription lagged, {0} events missed")]
    Lagged(u64),

    #[error("subscription disconnected: {0}")]
    Disconnected(String),
}

/// Unordered, at-least-once change stream for one topic. The stream ends
/// when the transport drops it.
pub type ChangeStream = BoxStream<'static, Result<Change, StreamError>>;

#[async_trait]
pub trait Realtime: Send + Sync {
    async fn subscribe(&self, topic: Topic) -> BackendResult<ChangeStream>;
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an object and return its path inside the bucket. Uploading to
    /// an existing path fails with `Conflict`.
    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> BackendResult<String>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
    async fn remove(&self, bucket: &str, paths: &[String]) -> BackendResult<()>;
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> BackendResult<AuthSession>;
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession>;
    async fn sign_out(&self) -> BackendResult<()>;
    async fn get_session(&self) -> BackendResult<Option<AuthSession>>;
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// One notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub token: String,
    pub title: String,
    pub body: String,
    pub chat_id: ChatId,
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, notification: &PushNotification) -> BackendResult<()>;
}
