//! Events pushed from the core to whatever renders it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use mingle_shared::types::{ChatId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// The signed-in user changed; `None` after sign-out.
    SessionChanged { user_id: Option<UserId> },
    ChatListChanged,
    ThreadChanged { chat_id: ChatId },
    ReactionsChanged { chat_id: ChatId },
    /// The open chat was deleted; the thread is now terminal.
    ChatDeleted { chat_id: ChatId },
    PresenceChanged {
        user_id: UserId,
        online_at: Option<DateTime<Utc>>,
    },
    /// A push notification for a chat other than the one on screen.
    Notification {
        chat_id: ChatId,
        title: String,
        body: String,
    },
    SubscriptionLost { topic: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

/// Forwards events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: UiEvent) {}
}

pub fn emit_event(sink: &dyn EventSink, event: UiEvent) {
    tracing::trace!(?event, "emit");
    sink.emit(event);
}
