//! Keeps one change-feed subscription alive and hands every change to a
//! trigger.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use mingle_shared::protocol::Topic;
use mingle_store::backend::{Realtime, StreamError};
use mingle_store::models::Change;

use crate::error::Result;

/// Server-side reaction to database changes.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &'static str;
    fn topic(&self) -> Topic;
    async fn handle(&self, change: Change) -> Result<()>;
}

/// Bounded memory of recently handled keys. The feed is at-least-once, so
/// triggers use this to skip redeliveries.
pub struct RecentKeys<K> {
    order: VecDeque<K>,
    seen: HashSet<K>,
    capacity: usize,
}

impl<K: Copy + Eq + Hash> RecentKeys<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `key`; false if it was already recorded.
    pub fn insert(&mut self, key: K) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Forget `key` so a redelivery is handled again.
    pub fn remove(&mut self, key: &K) -> bool {
        if !self.seen.remove(key) {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Record `key` as being handled; false if it already was.
pub fn claim<K: Copy + Eq + Hash>(recent: &Mutex<RecentKeys<K>>, key: K) -> bool {
    match recent.lock() {
        Ok(mut recent) => recent.insert(key),
        Err(poisoned) => poisoned.into_inner().insert(key),
    }
}

/// Undo [`claim`] after handling failed before anything went out.
pub fn release<K: Copy + Eq + Hash>(recent: &Mutex<RecentKeys<K>>, key: &K) {
    match recent.lock() {
        Ok(mut recent) => recent.remove(key),
        Err(poisoned) => poisoned.into_inner().remove(key),
    };
}

/// Run `trigger` until `shutdown` turns true. Trigger failures are logged
/// and never stop the loop; a dropped stream is resubscribed after
/// `retry_delay`.
pub async fn run_trigger(
    realtime: Arc<dyn Realtime>,
    trigger: Arc<dyn Trigger>,
    retry_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let topic = trigger.topic();
    while !*shutdown.borrow() {
        let mut stream = match realtime.subscribe(topic).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(trigger = trigger.name(), error = %e, "subscribe failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => continue,
                    _ = shutdown.changed() => break,
                }
            }
        };
        debug!(trigger = trigger.name(), topic = %topic, "trigger subscribed");

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(Ok(change)) => {
                        if let Err(e) = trigger.handle(change).await {
                            warn!(trigger = trigger.name(), error = %e, "trigger failed");
                        }
                    }
                    Some(Err(StreamError::Lagged(missed))) => {
                        warn!(trigger = trigger.name(), missed, "trigger fell behind, changes skipped");
                    }
                    Some(Err(StreamError::Disconnected(reason))) => {
                        debug!(trigger = trigger.name(), %reason, "trigger stream disconnected");
                        break;
                    }
                    None => break,
                },
                _ = shutdown.changed() => return,
            }
        }
    }
}
