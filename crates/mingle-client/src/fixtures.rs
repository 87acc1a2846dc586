//! Shared helpers for unit tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use mingle_store::LocalBackend;

use crate::config::ClientConfig;
use crate::events::{ChannelSink, UiEvent};
use crate::state::{AppState, Services};

pub fn backend() -> Arc<LocalBackend> {
    Arc::new(LocalBackend::in_memory().expect("in-memory backend"))
}

pub fn config() -> ClientConfig {
    ClientConfig {
        reconnect_base: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

/// A signed-in device for `name@mingle.test` on the shared backend.
pub async fn device(backend: &Arc<LocalBackend>, name: &str) -> Arc<AppState> {
    device_with_events(backend, name).await.0
}

pub async fn device_with_events(
    backend: &Arc<LocalBackend>,
    name: &str,
) -> (Arc<AppState>, mpsc::UnboundedReceiver<UiEvent>) {
    let (sink, rx) = ChannelSink::channel();
    let state = AppState::new(Services::local_device(backend.clone()), config(), sink);
    state.start().await.expect("start");
    state
        .session
        .sign_up(&format!("{name}@mingle.test"), "secret-pw", name)
        .await
        .expect("sign up");
    (state, rx)
}

/// Poll `check` until it holds, failing after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
