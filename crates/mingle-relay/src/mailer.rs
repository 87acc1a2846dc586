//! Invitation emails.
//!
//! Each newly created pending invitation produces one email naming the
//! inviter and the chat, with the invite link. Delivery goes through a
//! [`MailTransport`]; the HTTP one posts the email as JSON.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use mingle_shared::constants::{APP_NAME, UNKNOWN_USER_NAME};
use mingle_shared::invite::invite_url;
use mingle_shared::protocol::{ChangeKind, Filter, Table, Topic};
use mingle_shared::types::InvitationId;
use mingle_shared::BackendError;
use mingle_store::backend::ServiceStore;
use mingle_store::models::{Change, Invitation, InvitationStatus, Record};

use crate::error::{RelayError, Result};
use crate::worker::{claim, release, RecentKeys, Trigger};

const RECENT_INVITATIONS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteEmail {
    pub to: String,
    pub subject: String,
    pub inviter_name: String,
    pub chat_name: String,
    pub invite_link: String,
}

impl InviteEmail {
    pub fn new(to: &str, inviter_name: &str, chat_name: &str, invite_link: String) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("{inviter_name} invited you to join {chat_name} on {APP_NAME}"),
            inviter_name: inviter_name.to_string(),
            chat_name: chat_name.to_string(),
            invite_link,
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &InviteEmail) -> Result<()>;
}

pub struct HttpMailTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMailTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn deliver(&self, email: &InviteEmail) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "to": email.to,
                "subject": email.subject,
                "template": "invite",
                "variables": {
                    "inviter_name": email.inviter_name,
                    "chat_name": email.chat_name,
                    "invite_link": email.invite_link,
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Rejected {
                service: "mail",
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Logs each email instead of sending it.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn deliver(&self, email: &InviteEmail) -> Result<()> {
        info!(to = %email.to, link = %email.invite_link, "mail delivery disabled, invitation logged");
        Ok(())
    }
}

pub struct InviteMailer {
    service: Arc<dyn ServiceStore>,
    transport: Arc<dyn MailTransport>,
    site_url: String,
    recent: Mutex<RecentKeys<InvitationId>>,
}

impl InviteMailer {
    pub fn new(service: Arc<dyn ServiceStore>, transport: Arc<dyn MailTransport>, site_url: &str) -> Self {
        Self {
            service,
            transport,
            site_url: site_url.trim_end_matches('/').to_string(),
            recent: Mutex::new(RecentKeys::new(RECENT_INVITATIONS)),
        }
    }

    /// Email the invitee. Returns `None` when nothing was sent: the
    /// invitation is no longer pending or was already mailed. A failed
    /// attempt is not remembered, so a redelivery tries again.
    pub async fn send(&self, invitation: &Invitation) -> Result<Option<InviteEmail>> {
        if invitation.status != InvitationStatus::Pending {
            return Ok(None);
        }
        if !claim(&self.recent, invitation.id) {
            debug!(invitation_id = %invitation.id, "duplicate invitation event skipped");
            return Ok(None);
        }
        match self.mail(invitation).await {
            Ok(email) => Ok(Some(email)),
            Err(e) => {
                release(&self.recent, &invitation.id);
                Err(e)
            }
        }
    }

    async fn mail(&self, invitation: &Invitation) -> Result<InviteEmail> {
        let chat = self.service.chat(invitation.chat_id).await?;
        let inviter = match self.service.user(invitation.inviter_id).await {
            Ok(user) => user.display_name,
            Err(BackendError::NotFound(_)) => UNKNOWN_USER_NAME.to_string(),
            Err(e) => return Err(e.into()),
        };

        let email = InviteEmail::new(
            &invitation.invitee_email,
            &inviter,
            &chat.name,
            invite_url(&self.site_url, chat.id),
        );
        self.transport.deliver(&email).await?;
        info!(invitation_id = %invitation.id, chat_id = %chat.id, "invitation emailed");
        Ok(email)
    }
}

#[async_trait]
impl Trigger for InviteMailer {
    fn name(&self) -> &'static str {
        "mailer"
    }

    fn topic(&self) -> Topic {
        Topic::new(Table::Invitations, Filter::All)
    }

    async fn handle(&self, change: Change) -> Result<()> {
        if change.kind != ChangeKind::Insert {
            return Ok(());
        }
        if let Record::Invitation(invitation) = change.entity {
            self.send(&invitation).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mingle_store::backend::DataStore;
    use mingle_store::models::NewChat;
    use mingle_store::LocalBackend;

    use super::*;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<InviteEmail>>,
        /// Deliveries to refuse before accepting again.
        bounces: Mutex<usize>,
    }

    #[async_trait]
    impl MailTransport for Outbox {
        async fn deliver(&self, email: &InviteEmail) -> Result<()> {
            {
                let mut bounces = self.bounces.lock().unwrap();
                if *bounces > 0 {
                    *bounces -= 1;
                    return Err(RelayError::Rejected {
                        service: "mail",
                        status: 503,
                    });
                }
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    async fn invitations(backend: &LocalBackend, emails: &[&str]) -> Vec<Invitation> {
        let session = backend
            .create_account("ada@mingle.test", "secret-pw", "ada")
            .unwrap();
        backend.ensure_user(&session).await.unwrap();
        let chat = backend
            .create_chat(
                session.user_id,
                NewChat {
                    name: "Team".into(),
                    is_group: true,
                },
            )
            .await
            .unwrap();
        let emails: Vec<String> = emails.iter().map(|e| e.to_string()).collect();
        backend
            .create_invitations(session.user_id, chat.id, &emails)
            .await
            .unwrap()
    }

    #[test]
    fn subject_names_inviter_and_chat() {
        let email = InviteEmail::new("bob@mingle.test", "ada", "Team", "http://x/invite/1".into());
        assert_eq!(email.subject, "ada invited you to join Team on Mingle");
    }

    #[tokio::test]
    async fn one_email_per_invitation() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let invites = invitations(&backend, &["bob@mingle.test", "cat@mingle.test"]).await;
        let outbox = Arc::new(Outbox::default());
        let mailer = InviteMailer::new(backend.clone(), outbox.clone(), "https://mingle.example/");

        for invitation in &invites {
            mailer.send(invitation).await.unwrap();
        }
        // A redelivered insert is not mailed twice.
        assert!(mailer.send(&invites[0]).await.unwrap().is_none());

        let sent = outbox.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "bob@mingle.test");
        assert_eq!(sent[0].inviter_name, "ada");
        assert_eq!(sent[0].chat_name, "Team");
        assert_eq!(
            sent[0].invite_link,
            format!("https://mingle.example/invite/{}", invites[0].chat_id)
        );
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_on_redelivery() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let invite = invitations(&backend, &["bob@mingle.test"]).await.remove(0);
        let outbox = Arc::new(Outbox {
            bounces: Mutex::new(1),
            ..Outbox::default()
        });
        let mailer = InviteMailer::new(backend.clone(), outbox.clone(), "http://localhost:5173");

        assert!(mailer.send(&invite).await.is_err());
        assert!(mailer.send(&invite).await.unwrap().is_some());
        assert!(mailer.send(&invite).await.unwrap().is_none());
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accepted_invitations_are_not_mailed() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let mut invite = invitations(&backend, &["bob@mingle.test"]).await.remove(0);
        invite.status = InvitationStatus::Accepted;
        let outbox = Arc::new(Outbox::default());
        let mailer = InviteMailer::new(backend.clone(), outbox.clone(), "http://localhost:5173");

        assert!(mailer.send(&invite).await.unwrap().is_none());
        assert!(outbox.sent.lock().unwrap().is_empty());
    }
}
