//! Message push fan-out.
//!
//! Every new message is pushed to each participant of its chat except the
//! sender, once per registered device token. Members who left keep their
//! participant row and are still notified. Title is `"{sender} in {chat}"`,
//! body is the message text.
//!
//! A message id is remembered once its fan-out started. If the lookups
//! before it fail the id is forgotten again, so a redelivered event gets
//! another try.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use mingle_shared::constants::UNKNOWN_USER_NAME;
use mingle_shared::protocol::{ChangeKind, Filter, Table, Topic};
use mingle_shared::types::{MessageId, UserId};
use mingle_shared::BackendError;
use mingle_store::backend::{PushGateway, PushNotification, ServiceStore};
use mingle_store::models::{Change, ContentType, Message, Record};

use crate::error::Result;
use crate::worker::{claim, release, RecentKeys, Trigger};

const RECENT_MESSAGES: usize = 4096;

/// What one fan-out did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub failed: usize,
}

pub struct PushRelay {
    service: Arc<dyn ServiceStore>,
    gateway: Arc<dyn PushGateway>,
    recent: Mutex<RecentKeys<MessageId>>,
}

impl PushRelay {
    pub fn new(service: Arc<dyn ServiceStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self {
            service,
            gateway,
            recent: Mutex::new(RecentKeys::new(RECENT_MESSAGES)),
        }
    }

    /// Push `message` to everyone in its chat but the sender. A message
    /// already handled is skipped and reports an empty fan-out.
    pub async fn notify(&self, message: &Message) -> Result<FanOut> {
        if !claim(&self.recent, message.id) {
            debug!(message_id = %message.id, "duplicate message event skipped");
            return Ok(FanOut::default());
        }
        match self.fan_out(message).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Nothing was sent yet.
                release(&self.recent, &message.id);
                Err(e)
            }
        }
    }

    /// Errors only before the first notification goes out; per-device
    /// failures are counted instead.
    async fn fan_out(&self, message: &Message) -> Result<FanOut> {
        let (chat, sender, participants) = futures::try_join!(
            self.service.chat(message.chat_id),
            self.sender_name(message.sender_id),
            self.service.participants(message.chat_id),
        )?;

        let recipients: Vec<UserId> = participants
            .into_iter()
            .map(|p| p.user_id)
            .filter(|user| *user != message.sender_id)
            .collect();
        if recipients.is_empty() {
            return Ok(FanOut::default());
        }

        let tokens = self.service.push_tokens(&recipients).await?;
        if tokens.is_empty() {
            debug!(chat_id = %chat.id, "no registered devices to notify");
            return Ok(FanOut::default());
        }

        let title = format!("{sender} in {}", chat.name);
        let body = notification_body(message);
        let notifications: Vec<PushNotification> = tokens
            .into_iter()
            .map(|token| PushNotification {
                token: token.push_token,
                title: title.clone(),
                body: body.clone(),
                chat_id: chat.id,
            })
            .collect();

        let results = join_all(notifications.iter().map(|n| self.gateway.send(n))).await;
        let mut outcome = FanOut::default();
        for result in results {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(message_id = %message.id, error = %e, "push delivery failed");
                }
            }
        }
        info!(
            message_id = %message.id,
            chat_id = %chat.id,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "message push fan-out done"
        );
        Ok(outcome)
    }

    async fn sender_name(&self, sender: UserId) -> std::result::Result<String, BackendError> {
        match self.service.user(sender).await {
            Ok(user) => Ok(user.display_name),
            Err(BackendError::NotFound(_)) => Ok(UNKNOWN_USER_NAME.to_string()),
            Err(e) => Err(e),
        }
    }
}

/// Attachments without text still get a readable body.
fn notification_body(message: &Message) -> String {
    if !message.content.is_empty() {
        return message.content.clone();
    }
    match message.content_type {
        ContentType::Image => "Sent an image".to_string(),
        ContentType::Video => "Sent a video".to_string(),
        ContentType::File => "Sent a file".to_string(),
        ContentType::Text => String::new(),
    }
}

#[async_trait]
impl Trigger for PushRelay {
    fn name(&self) -> &'static str {
        "push"
    }

    fn topic(&self) -> Topic {
        Topic::new(Table::Messages, Filter::All)
    }

    async fn handle(&self, change: Change) -> Result<()> {
        if change.kind != ChangeKind::Insert {
            return Ok(());
        }
        if let Record::Message(message) = change.entity {
            self.notify(&message).await?;
        }
        Ok(())
    }
}
