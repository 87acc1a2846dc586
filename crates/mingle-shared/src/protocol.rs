//! Change-event protocol between the realtime backend and the client core.
//!
//! A [`Topic`] names one table plus one row filter. The backend pushes
//! [`ChangeEvent`]s for rows matching the topic, at least once and without
//! any per-row ordering guarantee.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChatId, UserId};

/// A row type that can live in a reconciled view.
pub trait Entity: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Sort key of every view. Ties are broken by [`Entity::key`].
    fn created_at(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Chats,
    ChatParticipants,
    Messages,
    Reactions,
    Invitations,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Chats => "chats",
            Self::ChatParticipants => "chat_participants",
            Self::Messages => "messages",
            Self::Reactions => "reactions",
            Self::Invitations => "invitations",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on a single column, as offered by the realtime backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    All,
    /// Primary key of the row.
    Id(Uuid),
    ChatId(ChatId),
    UserId(UserId),
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Id(id) => write!(f, "id=eq.{id}"),
            Self::ChatId(id) => write!(f, "chat_id=eq.{id}"),
            Self::UserId(id) => write!(f, "user_id=eq.{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub table: Table,
    pub filter: Filter,
}

impl Topic {
    pub fn new(table: Table, filter: Filter) -> Self {
        Self { table, filter }
    }

    pub fn name(&self) -> String {
        format!("{}:{}", self.table, self.filter)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.filter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change. For `Delete` the entity is the last known row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<E> {
    pub kind: ChangeKind,
    pub entity: E,
}

impl<E> ChangeEvent<E> {
    pub fn insert(entity: E) -> Self {
        Self {
            kind: ChangeKind::Insert,
            entity,
        }
    }

    pub fn update(entity: E) -> Self {
        Self {
            kind: ChangeKind::Update,
            entity,
        }
    }

    pub fn delete(entity: E) -> Self {
        Self {
            kind: ChangeKind::Delete,
            entity,
        }
    }

    pub fn map<F, T>(self, f: F) -> ChangeEvent<T>
    where
        F: FnOnce(E) -> T,
    {
        ChangeEvent {
            kind: self.kind,
            entity: f(self.entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_follow_filter_syntax() {
        let chat = ChatId(Uuid::nil());
        let topic = Topic::new(Table::Messages, Filter::ChatId(chat));
        assert_eq!(
            topic.name(),
            "messages:chat_id=eq.00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(Topic::new(Table::Chats, Filter::All).name(), "chats:*");
    }

    #[test]
    fn map_keeps_kind() {
        let event = ChangeEvent::delete(3u32).map(|n| n * 2);
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.entity, 6);
    }
}
