//! Reaction toggling.
//!
//! A toggle deletes the viewer's reaction if one exists and inserts one
//! otherwise, never both. Toggles for the same `(message, user, emoji)`
//! are serialized per toggler: a second call while one is in flight
//! returns [`ToggleOutcome::InFlight`] without touching the backend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use mingle_shared::constants::EMOJI_LIST;
use mingle_shared::types::{MessageId, UserId};
use mingle_shared::BackendError;
use mingle_store::backend::DataStore;
use mingle_store::models::Reaction;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added(Reaction),
    Removed(Reaction),
    /// Someone else got there first; the state already matches.
    Unchanged,
    /// The same toggle is still running.
    InFlight,
}

type ToggleKey = (MessageId, UserId, String);

pub struct ReactionToggler {
    store: Arc<dyn DataStore>,
    in_flight: Mutex<HashSet<ToggleKey>>,
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ToggleKey>>,
    key: ToggleKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl ReactionToggler {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, actor: UserId, message: MessageId, emoji: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&(message, actor, emoji.to_string())))
            .unwrap_or(false)
    }

    pub async fn toggle(&self, actor: UserId, message: MessageId, emoji: &str) -> ClientResult<ToggleOutcome> {
        if !EMOJI_LIST.contains(&emoji) {
            return Err(ClientError::Invalid(format!("unsupported reaction {emoji}")));
        }

        let key = (message, actor, emoji.to_string());
        {
            let mut set = self
                .in_flight
                .lock()
                .map_err(|_| ClientError::Invalid("reaction state poisoned".into()))?;
            if !set.insert(key.clone()) {
                debug!(message_id = %message, emoji, "toggle already in flight");
                return Ok(ToggleOutcome::InFlight);
            }
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key,
        };

        let existing = self.store.find_reaction(actor, message, emoji).await?;
        let outcome = match existing {
            Some(_) => match self.store.remove_reaction(actor, message, emoji).await? {
                Some(row) => ToggleOutcome::Removed(row),
                None => ToggleOutcome::Unchanged,
            },
            None => match self.store.add_reaction(actor, message, emoji).await {
                Ok(row) => ToggleOutcome::Added(row),
                Err(BackendError::Conflict(_)) => ToggleOutcome::Unchanged,
                Err(e) => return Err(e.into()),
            },
        };

        debug!(message_id = %message, emoji, ?outcome, "reaction toggled");
        Ok(outcome)
    }
}
