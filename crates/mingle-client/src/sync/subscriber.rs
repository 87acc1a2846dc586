//! Change-event subscriptions.
//!
//! [`Subscriber::subscribe`] opens one realtime stream for one topic and
//! spawns a pump task that hands every event to a handler. The handler sits
//! behind a mutex that [`SubscriptionHandle::close`] empties, so once
//! `close` returns no event reaches the handler again, even if the pump
//! task has not observed the abort yet.
//!
//! When the stream ends the pump reopens it with capped exponential backoff
//! and tells the handler to [`SubscriptionEvent::Resync`], since events may
//! have been missed in between.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mingle_shared::protocol::{ChangeEvent, Topic};
use mingle_shared::BackendResult;
use mingle_store::backend::{ChangeStream, Realtime, StreamError};
use mingle_store::models::{Change, FromRecord};

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Change(Change),
    /// The stream dropped. Events may be lost until the next `Resync`.
    Disconnected,
    /// Events may have been missed; refetch the snapshot.
    Resync,
}

type Handler = Box<dyn FnMut(SubscriptionEvent) + Send>;
type HandlerSlot = Arc<Mutex<Option<Handler>>>;

/// Capped exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            base: config.reconnect_base,
            max: config.reconnect_max,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based). Lies in
    /// `[ceiling / 2, ceiling]` where the ceiling doubles per attempt up to
    /// `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        let ceiling = self.base.saturating_mul(factor).min(self.max);
        let half = ceiling / 2;
        let jitter_ms = half.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        half + jitter
    }
}

pub struct Subscriber {
    realtime: Arc<dyn Realtime>,
    backoff: Backoff,
}

impl Subscriber {
    pub fn new(realtime: Arc<dyn Realtime>, config: &ClientConfig) -> Self {
        Self {
            realtime,
            backoff: Backoff::from_config(config),
        }
    }

    /// Open a subscription. The initial subscribe call is awaited so that
    /// a rejected topic surfaces as an error; later drops are retried in the
    /// background.
    pub async fn subscribe<F>(&self, topic: Topic, handler: F) -> BackendResult<SubscriptionHandle>
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        let stream = self.realtime.subscribe(topic).await?;
        let slot: HandlerSlot = Arc::new(Mutex::new(Some(Box::new(handler))));

        let task = tokio::spawn(pump(
            self.realtime.clone(),
            topic,
            stream,
            slot.clone(),
            self.backoff,
        ));

        debug!(topic = %topic, "subscribed");
        Ok(SubscriptionHandle {
            topic,
            slot,
            task: Some(task),
        })
    }

    /// Subscribe with a handler that only sees rows of type `E`.
    /// Records of other tables are dropped.
    pub async fn subscribe_typed<E, F>(&self, topic: Topic, mut handler: F) -> BackendResult<SubscriptionHandle>
    where
        E: FromRecord + Send + 'static,
        F: FnMut(TypedEvent<E>) + Send + 'static,
    {
        self.subscribe(topic, move |event| match event {
            SubscriptionEvent::Change(change) => {
                let kind = change.kind;
                if let Some(entity) = E::from_record(change.entity) {
                    handler(TypedEvent::Change(ChangeEvent { kind, entity }));
                }
            }
            SubscriptionEvent::Disconnected => handler(TypedEvent::Disconnected),
            SubscriptionEvent::Resync => handler(TypedEvent::Resync),
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent<E> {
    Change(ChangeEvent<E>),
    Disconnected,
    Resync,
}

/// Hand one event to the handler. Returns `false` once the subscription
/// was closed.
fn deliver(slot: &HandlerSlot, event: SubscriptionEvent) -> bool {
    let mut guard = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match guard.as_mut() {
        Some(handler) => {
            handler(event);
            true
        }
        None => false,
    }
}

fn is_open(slot: &HandlerSlot) -> bool {
    match slot.lock() {
        Ok(guard) => guard.is_some(),
        Err(poisoned) => poisoned.into_inner().is_some(),
    }
}

async fn pump(
    realtime: Arc<dyn Realtime>,
    topic: Topic,
    mut stream: ChangeStream,
    slot: HandlerSlot,
    backoff: Backoff,
) {
    loop {
        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(change) => SubscriptionEvent::Change(change),
                Err(StreamError::Lagged(missed)) => {
                    warn!(topic = %topic, missed, "subscription lagged, resyncing");
                    SubscriptionEvent::Resync
                }
                Err(StreamError::Disconnected(reason)) => {
                    warn!(topic = %topic, %reason, "subscription disconnected");
                    break;
                }
            };
            if !deliver(&slot, event) {
                return;
            }
        }

        if !deliver(&slot, SubscriptionEvent::Disconnected) {
            return;
        }

        let mut attempt = 0u32;
        stream = loop {
            tokio::time::sleep(backoff.delay(attempt)).await;
            if !is_open(&slot) {
                return;
            }
            match realtime.subscribe(topic).await {
                Ok(stream) => break stream,
                Err(e) => {
                    debug!(topic = %topic, attempt, error = %e, "resubscribe failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        };

        info!(topic = %topic, attempts = attempt + 1, "subscription restored");
        if !deliver(&slot, SubscriptionEvent::Resync) {
            return;
        }
    }
}

/// Owner of one open subscription. Dropping it closes the subscription.
pub struct SubscriptionHandle {
    topic: Topic,
    slot: HandlerSlot,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_closed(&self) -> bool {
        !is_open(&self.slot)
    }

    /// Release the subscription. Idempotent. Blocks only while an event is
    /// being handled; after it returns the handler is gone.
    pub fn close(&mut self) {
        let handler = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if handler.is_some() {
            debug!(topic = %self.topic, "unsubscribed");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
