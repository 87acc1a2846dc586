//! Push gateways: FCM over HTTP, and a logging stand-in for nodes without
//! an FCM key.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use mingle_shared::BackendResult;
use mingle_store::backend::{PushGateway, PushNotification};

use crate::error::{RelayError, Result};

/// Request body for the legacy FCM send endpoint.
pub fn fcm_payload(notification: &PushNotification, site_url: &str) -> Value {
    json!({
        "to": notification.token,
        "notification": {
            "title": notification.title,
            "body": notification.body,
            "click_action": format!("{site_url}/chat/{}", notification.chat_id),
        },
        "data": {
            "chatId": notification.chat_id.to_string(),
        },
    })
}

pub struct FcmGateway {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
    site_url: String,
}

impl FcmGateway {
    pub fn new(endpoint: &str, server_key: &str, site_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            server_key: server_key.to_string(),
            site_url: site_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, notification: &PushNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("key={}", self.server_key))
            .json(&fcm_payload(notification, &self.site_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Rejected {
                service: "fcm",
                status: status.as_u16(),
            });
        }
        debug!(chat_id = %notification.chat_id, "push delivered to fcm");
        Ok(())
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, notification: &PushNotification) -> BackendResult<()> {
        self.post(notification).await.map_err(Into::into)
    }
}

/// Logs each notification instead of delivering it.
pub struct LogGateway;

#[async_trait]
impl PushGateway for LogGateway {
    async fn send(&self, notification: &PushNotification) -> BackendResult<()> {
        info!(
            chat_id = %notification.chat_id,
            title = %notification.title,
            "push delivery disabled, notification dropped"
        );
        Ok(())
    }
}
