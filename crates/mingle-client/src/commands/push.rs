use tracing::{debug, info};

use mingle_shared::types::ChatId;

use crate::error::{ClientError, ClientResult};
use crate::events::{emit_event, UiEvent};
use crate::state::AppState;

/// Register this device's push token. A user has one token; registering
/// again replaces it.
pub async fn register_push_token(state: &AppState, token: &str) -> ClientResult<()> {
    let viewer = state.viewer()?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ClientError::Invalid("push token cannot be empty".into()));
    }
    state
        .services
        .store
        .register_push_token(viewer, token)
        .await?;
    info!(user_id = %viewer, "push token registered");
    Ok(())
}

/// Handle a push that arrived while the app is in the foreground.
///
/// Notifications for the chat on screen are dropped, the thread already
/// shows the message. Returns whether the notification was surfaced.
pub fn handle_foreground_notification(state: &AppState, chat_id: ChatId, title: &str, body: &str) -> bool {
    if state.open_chat() == Some(chat_id) {
        debug!(chat_id = %chat_id, "notification for open chat suppressed");
        return false;
    }
    emit_event(
        state.sink.as_ref(),
        UiEvent::Notification {
            chat_id,
            title: title.to_string(),
            body: body.to_string(),
        },
    );
    true
}
