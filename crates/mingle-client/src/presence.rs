//! Presence heartbeat and the derived online flag.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use mingle_shared::types::UserId;
use mingle_store::backend::DataStore;

/// Whether a heartbeat at `online_at` still counts as online at `now`.
/// Computed at render time, never stored.
pub fn is_online(online_at: Option<DateTime<Utc>>, now: DateTime<Utc>, window: chrono::Duration) -> bool {
    match online_at {
        Some(at) => now.signed_duration_since(at) < window,
        None => false,
    }
}

/// Periodic writer of the signed-in user's `online_at`.
///
/// Reports once immediately on start, then every `interval`. The task is
/// aborted by [`PresenceReporter::stop`] or on drop.
pub struct PresenceReporter {
    user: UserId,
    task: Option<JoinHandle<()>>,
}

impl PresenceReporter {
    pub fn start(store: Arc<dyn DataStore>, user: UserId, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.report_presence(user, Utc::now()).await {
                    Ok(_) => debug!(user_id = %user, "presence reported"),
                    // The next tick retries.
                    Err(e) => warn!(user_id = %user, error = %e, "presence report failed"),
                }
            }
        });
        debug!(user_id = %user, ?interval, "presence reporter started");
        Self {
            user,
            task: Some(task),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(user_id = %self.user, "presence reporter stopped");
        }
    }
}

impl Drop for PresenceReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use mingle_shared::protocol::{ChangeKind, Filter, Table, Topic};
    use mingle_store::backend::AuthProvider;
    use mingle_store::feed::FeedReceiver;
    use mingle_store::LocalBackend;

    use super::*;

    #[test]
    fn window_boundaries() {
        let now = Utc::now();
        let window = chrono::Duration::minutes(5);
        assert!(is_online(Some(now - chrono::Duration::minutes(4)), now, window));
        assert!(!is_online(Some(now - chrono::Duration::minutes(6)), now, window));
        assert!(!is_online(Some(now - window), now, window));
        assert!(!is_online(None, now, window));
    }

    async fn heartbeats(rx: &mut FeedReceiver) -> usize {
        let mut count = 0;
        while let Ok(Some(Ok(change))) =
            tokio::time::timeout(Duration::from_millis(10), rx.recv()).await
        {
            if change.kind == ChangeKind::Update {
                count += 1;
            }
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn reports_immediately_then_on_interval_until_stopped() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = backend.sign_up("ada@mingle.test", "secret-pw", "Ada").await.unwrap();
        let user = backend.ensure_user(&session).await.unwrap().id;
        let mut rx = backend
            .feed()
            .subscribe(Topic::new(Table::Users, Filter::All))
            .unwrap();

        let mut reporter = PresenceReporter::start(backend.clone(), user, Duration::from_secs(240));
        assert!(reporter.is_running());
        assert_eq!(heartbeats(&mut rx).await, 1);

        tokio::time::sleep(Duration::from_secs(240)).await;
        assert_eq!(heartbeats(&mut rx).await, 1);

        reporter.stop();
        assert!(!reporter.is_running());
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(heartbeats(&mut rx).await, 0);

        let stored = backend.get_user(user).await.unwrap();
        assert!(stored.online_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_the_task() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = backend.sign_up("ada@mingle.test", "secret-pw", "Ada").await.unwrap();
        let user = backend.ensure_user(&session).await.unwrap().id;
        let mut rx = backend
            .feed()
            .subscribe(Topic::new(Table::Users, Filter::All))
            .unwrap();

        drop(PresenceReporter::start(backend.clone(), user, Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(heartbeats(&mut rx).await <= 1);
    }
}
