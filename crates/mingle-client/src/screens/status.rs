//! Online indicator for one user.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use mingle_shared::protocol::{ChangeKind, Filter, Table, Topic};
use mingle_shared::types::UserId;
use mingle_store::models::User;

use crate::error::ClientResult;
use crate::events::{emit_event, UiEvent};
use crate::presence::is_online;
use crate::screens::lock;
use crate::state::AppState;
use crate::sync::{SubscriptionHandle, TypedEvent};

/// Tracks one user's last heartbeat. `online` is derived on every read
/// from the wall clock, so the flag decays without any further event.
pub struct UserStatus {
    user: UserId,
    window: chrono::Duration,
    online_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    subscription: Option<SubscriptionHandle>,
}

impl UserStatus {
    pub async fn observe(state: Arc<AppState>, user: UserId) -> ClientResult<Self> {
        let online_at = Arc::new(Mutex::new(None));

        let slot = online_at.clone();
        let sink = state.sink.clone();
        let subscription = state
            .subscriber()
            .subscribe_typed::<User, _>(
                Topic::new(Table::Users, Filter::Id(user.as_uuid())),
                move |event| {
                    if let TypedEvent::Change(change) = event {
                        if change.kind == ChangeKind::Delete {
                            return;
                        }
                        let at = change.entity.online_at;
                        let mut current = lock(&slot);
                        // Heartbeats only move forward.
                        if at > *current {
                            *current = at;
                            drop(current);
                            emit_event(sink.as_ref(), UiEvent::PresenceChanged { user_id: user, online_at: at });
                        }
                    }
                },
            )
            .await?;

        let fetched = state.services.store.get_user(user).await?.online_at;
        {
            let mut current = lock(&online_at);
            if fetched > *current {
                *current = fetched;
            }
        }

        Ok(Self {
            user,
            window: state.config.presence_window,
            online_at,
            subscription: Some(subscription),
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn online_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.online_at)
    }

    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        is_online(self.online_at(), now, self.window)
    }

    pub fn is_online(&self) -> bool {
        self.is_online_at(Utc::now())
    }

    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }
}

impl Drop for UserStatus {
    fn drop(&mut self) {
        self.close();
    }
}
