//! In-process change feed.
//!
//! Every successful write of the local backend is published here. Readers
//! subscribe to a [`Topic`] and only see matching rows. Delivery is
//! broadcast: a slow reader lags instead of blocking writers.

use std::sync::Mutex;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use mingle_shared::protocol::Topic;

use crate::backend::{ChangeStream, StreamError};
use crate::models::Change;

pub const DEFAULT_CAPACITY: usize = 1024;

pub struct ChangeFeed {
    tx: Mutex<broadcast::Sender<Change>>,
    capacity: usize,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx: Mutex::new(tx),
            capacity,
        }
    }

    /// Publish a change; returns how many readers were listening.
    pub fn publish(&self, change: Change) -> usize {
        let table = change.entity.table();
        let kind = change.kind;
        let delivered = match self.tx.lock() {
            Ok(tx) => tx.send(change).unwrap_or(0),
            Err(_) => 0,
        };
        tracing::trace!(%table, ?kind, delivered, "change published");
        delivered
    }

    pub fn subscribe(&self, topic: Topic) -> Option<FeedReceiver> {
        let rx = self.tx.lock().ok()?.subscribe();
        Some(FeedReceiver { rx, topic })
    }

    /// Drop every open reader, as a transport disconnect would.
    pub fn reset(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            let (fresh, _) = broadcast::channel(self.capacity);
            *tx = fresh;
            tracing::debug!("change feed reset, readers disconnected");
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Topic-filtered reader of the feed.
pub struct FeedReceiver {
    rx: broadcast::Receiver<Change>,
    topic: Topic,
}

impl FeedReceiver {
    /// Next matching change. `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<Result<Change, StreamError>> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if change.entity.table() == self.topic.table
                        && change.entity.matches(&self.topic.filter)
                    {
                        return Some(Ok(change));
                    }
                }
                Err(RecvError::Lagged(missed)) => return Some(Err(StreamError::Lagged(missed))),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> ChangeStream {
        stream::unfold(self, |mut receiver| async move {
            let item = receiver.recv().await?;
            Some((item, receiver))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mingle_shared::protocol::{ChangeEvent, Filter, Table};
    use mingle_shared::types::{ChatId, MessageId, UserId};

    use super::*;
    use crate::models::{ContentType, Message, Record};

    fn message(chat: ChatId) -> Record {
        Record::Message(Message {
            id: MessageId::new(),
            chat_id: chat,
            sender_id: UserId::new(),
            content: "hi".into(),
            content_type: ContentType::Text,
            media_url: None,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn receiver_only_sees_its_topic() {
        let feed = ChangeFeed::default();
        let chat = ChatId::new();
        let mut rx = feed
            .subscribe(Topic::new(Table::Messages, Filter::ChatId(chat)))
            .unwrap();

        feed.publish(ChangeEvent::insert(message(ChatId::new())));
        let wanted = message(chat);
        feed.publish(ChangeEvent::insert(wanted.clone()));

        let change = rx.recv().await.unwrap().unwrap();
        assert_eq!(change.entity, wanted);
    }

    #[tokio::test]
    async fn reset_closes_readers() {
        let feed = ChangeFeed::default();
        let mut stream = feed
            .subscribe(Topic::new(Table::Messages, Filter::All))
            .unwrap()
            .into_stream();
        feed.reset();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn lag_is_reported() {
        let feed = ChangeFeed::new(2);
        let mut rx = feed
            .subscribe(Topic::new(Table::Messages, Filter::All))
            .unwrap();
        for _ in 0..5 {
            feed.publish(ChangeEvent::insert(message(ChatId::new())));
        }
        assert!(matches!(
            rx.recv().await,
            Some(Err(StreamError::Lagged(_)))
        ));
    }
}
