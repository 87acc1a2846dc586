//! Session lifecycle and the presence heartbeat bound to it.
//!
//! `LoggedOut -> LoggingIn -> Active -> LoggedOut`. Entering `Active`
//! ensures the profile row exists and starts a [`PresenceReporter`];
//! leaving it stops the reporter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use mingle_shared::types::UserId;
use mingle_store::backend::{AuthProvider, DataStore};
use mingle_store::models::AuthSession;

use crate::error::{ClientError, ClientResult};
use crate::presence::PresenceReporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    Active(AuthSession),
}

impl SessionState {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Active(session) => Some(session.user_id),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

type ChangeCallback = Box<dyn Fn(&SessionState) + Send + Sync>;

pub struct SessionContext {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DataStore>,
    heartbeat: Duration,
    state: watch::Sender<SessionState>,
    presence: Mutex<Option<PresenceReporter>>,
    on_change: Mutex<Option<ChangeCallback>>,
}

impl SessionContext {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn DataStore>, heartbeat: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::LoggedOut);
        Self {
            auth,
            store,
            heartbeat,
            state,
            presence: Mutex::new(None),
            on_change: Mutex::new(None),
        }
    }

    /// Install the change callback and restore a persisted session, if any.
    pub async fn init<F>(&self, on_change: F) -> ClientResult<SessionState>
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.on_change.lock() {
            *slot = Some(Box::new(on_change));
        }
        match self.auth.get_session().await? {
            Some(session) => {
                info!(user_id = %session.user_id, "restoring session");
                self.activate(session).await?;
            }
            None => self.transition(SessionState::LoggedOut),
        }
        Ok(self.state())
    }

    /// Stop the heartbeat and forget the callback. The session itself stays
    /// signed in with the auth provider.
    pub fn teardown(&self) {
        self.stop_presence();
        if let Ok(mut slot) = self.on_change.lock() {
            slot.take();
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        self.transition(SessionState::LoggingIn);
        match self.auth.sign_in(email, password).await {
            Ok(session) => self.activate(session).await,
            Err(e) => {
                warn!(error = %e, "sign-in failed");
                self.transition(SessionState::LoggedOut);
                Err(e.into())
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> ClientResult<AuthSession> {
        self.transition(SessionState::LoggingIn);
        match self.auth.sign_up(email, password, display_name).await {
            Ok(session) => self.activate(session).await,
            Err(e) => {
                warn!(error = %e, "sign-up failed");
                self.transition(SessionState::LoggedOut);
                Err(e.into())
            }
        }
    }

    pub async fn sign_out(&self) -> ClientResult<()> {
        self.stop_presence();
        let result = self.auth.sign_out().await;
        self.transition(SessionState::LoggedOut);
        info!("signed out");
        result.map_err(ClientError::from)
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_session(&self) -> ClientResult<AuthSession> {
        match &*self.state.borrow() {
            SessionState::Active(session) => Ok(session.clone()),
            _ => Err(ClientError::NotSignedIn),
        }
    }

    pub fn current_user(&self) -> ClientResult<UserId> {
        self.state.borrow().user_id().ok_or(ClientError::NotSignedIn)
    }

    pub fn is_reporting_presence(&self) -> bool {
        self.presence
            .lock()
            .map(|p| p.as_ref().is_some_and(PresenceReporter::is_running))
            .unwrap_or(false)
    }

    async fn activate(&self, session: AuthSession) -> ClientResult<AuthSession> {
        if let Err(e) = self.store.ensure_user(&session).await {
            warn!(user_id = %session.user_id, error = %e, "could not create profile");
            self.transition(SessionState::LoggedOut);
            return Err(e.into());
        }

        self.stop_presence();
        let reporter = PresenceReporter::start(self.store.clone(), session.user_id, self.heartbeat);
        if let Ok(mut slot) = self.presence.lock() {
            *slot = Some(reporter);
        }

        info!(user_id = %session.user_id, "session active");
        self.transition(SessionState::Active(session.clone()));
        Ok(session)
    }

    fn stop_presence(&self) {
        if let Ok(mut slot) = self.presence.lock() {
            if let Some(mut reporter) = slot.take() {
                reporter.stop();
            }
        }
    }

    fn transition(&self, next: SessionState) {
        self.state.send_replace(next.clone());
        if let Ok(callback) = self.on_change.lock() {
            if let Some(callback) = callback.as_ref() {
                callback(&next);
            }
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.stop_presence();
    }
}
