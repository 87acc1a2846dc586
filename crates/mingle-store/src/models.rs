//! Domain rows as the backend stores them.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! to the UI layer or a push payload unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_shared::protocol::{ChangeEvent, Entity, Filter, Table};
use mingle_shared::types::{ChatId, InvitationId, MessageId, ReactionId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Public profile row. `online_at` is the last presence heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    /// Object path inside the avatars bucket.
    pub avatar_url: Option<String>,
    pub online_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    /// `Some(None)` clears the avatar.
    pub avatar_url: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSettings {
    pub participants_can_invite: bool,
    /// `None` means invitations never expire.
    pub invitation_expiry_hours: Option<u32>,
    pub only_admins_can_remove_messages: bool,
    pub only_admins_can_edit_settings: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            participants_can_invite: true,
            invitation_expiry_hours: None,
            only_admins_can_remove_messages: false,
            only_admins_can_edit_settings: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub is_group: bool,
    pub created_by: UserId,
    pub settings: ChatSettings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewChat {
    pub name: String,
    pub is_group: bool,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// Membership row, unique on `(chat_id, user_id)`. Leaving sets `left_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Video,
    File,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub content_type: ContentType,
    /// Public URL of the attachment, if any.
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub content: String,
    pub content_type: ContentType,
    pub media_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// One emoji reaction, unique on `(message_id, user_id, emoji)`.
///
/// `chat_id` is denormalized from the message so reaction topics can be
/// filtered per chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub id: ReactionId,
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Invitation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    pub id: InvitationId,
    pub chat_id: ChatId,
    pub inviter_id: UserId,
    pub invitee_email: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Push token / auth session
// ---------------------------------------------------------------------------

/// Device token registered with the push provider. One per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushToken {
    pub user_id: UserId,
    pub push_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub issued_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Change feed records
// ---------------------------------------------------------------------------

/// Any row the realtime feed can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    User(User),
    Chat(Chat),
    Participant(Participant),
    Message(Message),
    Reaction(Reaction),
    Invitation(Invitation),
}

/// Change event as published by the backend feed.
pub type Change = ChangeEvent<Record>;

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Self::User(_) => Table::Users,
            Self::Chat(_) => Table::Chats,
            Self::Participant(_) => Table::ChatParticipants,
            Self::Message(_) => Table::Messages,
            Self::Reaction(_) => Table::Reactions,
            Self::Invitation(_) => Table::Invitations,
        }
    }

    /// Whether this row passes a single-column equality filter. Filtering on
    /// a column the table lacks never matches.
    pub fn matches(&self, filter: &Filter) -> bool {
        match (filter, self) {
            (Filter::All, _) => true,

            (Filter::Id(id), Self::User(u)) => u.id.0 == *id,
            (Filter::Id(id), Self::Chat(c)) => c.id.0 == *id,
            (Filter::Id(id), Self::Message(m)) => m.id.0 == *id,
            (Filter::Id(id), Self::Reaction(r)) => r.id.0 == *id,
            (Filter::Id(id), Self::Invitation(i)) => i.id.0 == *id,
            (Filter::Id(_), Self::Participant(_)) => false,

            (Filter::ChatId(chat), Self::Participant(p)) => p.chat_id == *chat,
            (Filter::ChatId(chat), Self::Message(m)) => m.chat_id == *chat,
            (Filter::ChatId(chat), Self::Reaction(r)) => r.chat_id == *chat,
            (Filter::ChatId(chat), Self::Invitation(i)) => i.chat_id == *chat,
            (Filter::ChatId(_), Self::User(_) | Self::Chat(_)) => false,

            (Filter::UserId(user), Self::Participant(p)) => p.user_id == *user,
            (Filter::UserId(user), Self::Reaction(r)) => r.user_id == *user,
            (Filter::UserId(_), _) => false,
        }
    }
}

/// Extract a typed row from a feed record.
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Option<Self>;
}

macro_rules! record_variant {
    ($ty:ident) => {
        impl FromRecord for $ty {
            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$ty(row) => Some(row),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Record {
            fn from(row: $ty) -> Self {
                Record::$ty(row)
            }
        }
    };
}

record_variant!(User);
record_variant!(Chat);
record_variant!(Participant);
record_variant!(Message);
record_variant!(Reaction);
record_variant!(Invitation);

// ---------------------------------------------------------------------------
// View entities
// ---------------------------------------------------------------------------

impl Entity for Chat {
    type Key = ChatId;

    fn key(&self) -> ChatId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Message {
    type Key = MessageId;

    fn key(&self) -> MessageId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Reaction {
    type Key = ReactionId;

    fn key(&self) -> ReactionId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Participant {
    type Key = (ChatId, UserId);

    fn key(&self) -> (ChatId, UserId) {
        (self.chat_id, self.user_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.joined_at
    }
}

impl Entity for User {
    type Key = UserId;

    fn key(&self) -> UserId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(chat: ChatId) -> Message {
        Message {
            id: MessageId::new(),
            chat_id: chat,
            sender_id: UserId::new(),
            content: "hi".into(),
            content_type: ContentType::Text,
            media_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn message_matches_chat_filter_only() {
        let chat = ChatId::new();
        let record = Record::Message(message(chat));
        assert!(record.matches(&Filter::All));
        assert!(record.matches(&Filter::ChatId(chat)));
        assert!(!record.matches(&Filter::ChatId(ChatId::new())));
        assert!(!record.matches(&Filter::UserId(UserId::new())));
    }

    #[test]
    fn from_record_rejects_other_tables() {
        let record = Record::Message(message(ChatId::new()));
        assert!(Chat::from_record(record.clone()).is_none());
        assert!(Message::from_record(record).is_some());
    }

    #[test]
    fn role_strings() {
        for role in [
            ParticipantRole::Owner,
            ParticipantRole::Admin,
            ParticipantRole::Member,
        ] {
            assert_eq!(ParticipantRole::parse(role.as_str()), Some(role));
        }
        assert!(ParticipantRole::Admin.is_admin());
        assert!(!ParticipantRole::Member.is_admin());
    }
}
