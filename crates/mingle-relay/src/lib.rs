//! # mingle-relay
//!
//! Server-side triggers that react to the backend change feed:
//! - **push**: fans every new message out to the other participants'
//!   devices through FCM
//! - **mailer**: emails each new invitation to its invitee

pub mod config;
pub mod error;
pub mod fcm;
pub mod mailer;
pub mod push;
pub mod worker;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use mingle_store::backend::{PushGateway, Realtime, ServiceStore};

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use mailer::{InviteEmail, InviteMailer, MailTransport};
pub use push::{FanOut, PushRelay};
pub use worker::{run_trigger, Trigger};

/// Gateway and transport picked from the configuration. Missing
/// credentials fall back to the logging stand-ins.
pub fn outbound(config: &RelayConfig) -> Result<(Arc<dyn PushGateway>, Arc<dyn MailTransport>)> {
    let gateway: Arc<dyn PushGateway> = match &config.fcm_server_key {
        Some(key) => Arc::new(fcm::FcmGateway::new(
            &config.fcm_endpoint,
            key,
            &config.site_url,
            config.http_timeout,
        )?),
        None => Arc::new(fcm::LogGateway),
    };
    let transport: Arc<dyn MailTransport> = match &config.mail_endpoint {
        Some(endpoint) => Arc::new(mailer::HttpMailTransport::new(endpoint, config.http_timeout)?),
        None => Arc::new(mailer::LogTransport),
    };
    Ok((gateway, transport))
}

/// Running triggers. Dropping it without [`Relay::shutdown`] leaves the
/// tasks running until the runtime stops.
pub struct Relay {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Relay {
    pub fn start(
        realtime: Arc<dyn Realtime>,
        service: Arc<dyn ServiceStore>,
        gateway: Arc<dyn PushGateway>,
        transport: Arc<dyn MailTransport>,
        config: &RelayConfig,
    ) -> Self {
        let (stop, shutdown) = watch::channel(false);
        let triggers: Vec<Arc<dyn Trigger>> = vec![
            Arc::new(PushRelay::new(service.clone(), gateway)),
            Arc::new(InviteMailer::new(service, transport, &config.site_url)),
        ];

        let tasks = triggers
            .into_iter()
            .map(|trigger| {
                info!(trigger = trigger.name(), "starting trigger");
                tokio::spawn(run_trigger(
                    realtime.clone(),
                    trigger,
                    config.retry_delay,
                    shutdown.clone(),
                ))
            })
            .collect();

        Self { stop, tasks }
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("relay stopped");
    }
}
