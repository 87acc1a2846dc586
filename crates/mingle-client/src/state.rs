//! State shared by every screen and command.

use std::sync::{Arc, Mutex};

use mingle_shared::types::{ChatId, UserId};
use mingle_store::backend::{AuthProvider, DataStore, ObjectStorage, Realtime};
use mingle_store::{LocalBackend, LocalSession};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::events::{emit_event, EventSink, NullSink, UiEvent};
use crate::session::{SessionContext, SessionState};
use crate::sync::{SnapshotFetcher, Subscriber};

/// Handles to the backend collaborators.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DataStore>,
    pub realtime: Arc<dyn Realtime>,
    pub objects: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthProvider>,
}

impl Services {
    /// Every collaborator backed by one local backend, sharing its session.
    pub fn local(backend: Arc<LocalBackend>) -> Self {
        Self {
            store: backend.clone(),
            realtime: backend.clone(),
            objects: backend.clone(),
            auth: backend,
        }
    }

    /// A separate device on a shared local backend, with its own session.
    pub fn local_device(backend: Arc<LocalBackend>) -> Self {
        Self {
            store: backend.clone(),
            realtime: backend.clone(),
            objects: backend.clone(),
            auth: Arc::new(LocalSession::new(backend)),
        }
    }
}

/// Central client state.
///
/// Holds the collaborators, configuration, the session context and the
/// sink that receives UI events. `open_chat` is the thread currently on
/// screen, used to suppress notifications for it.
pub struct AppState {
    pub services: Services,
    pub config: ClientConfig,
    pub session: SessionContext,
    pub sink: Arc<dyn EventSink>,
    open_chat: Mutex<Option<ChatId>>,
}

impl AppState {
    pub fn new(services: Services, config: ClientConfig, sink: Arc<dyn EventSink>) -> Arc<Self> {
        let session = SessionContext::new(
            services.auth.clone(),
            services.store.clone(),
            config.heartbeat_interval,
        );
        Arc::new(Self {
            services,
            config,
            session,
            sink,
            open_chat: Mutex::new(None),
        })
    }

    /// Default configuration, events discarded.
    pub fn headless(services: Services) -> Arc<Self> {
        Self::new(services, ClientConfig::default(), Arc::new(NullSink))
    }

    /// Restore the persisted session and start reporting session changes
    /// to the sink.
    pub async fn start(&self) -> ClientResult<SessionState> {
        let sink = self.sink.clone();
        self.session
            .init(move |state| {
                if *state != SessionState::LoggingIn {
                    emit_event(
                        sink.as_ref(),
                        UiEvent::SessionChanged {
                            user_id: state.user_id(),
                        },
                    );
                }
            })
            .await
    }

    /// Stop background work owned by the session.
    pub fn shutdown(&self) {
        self.session.teardown();
        self.set_open_chat(None);
    }

    pub fn fetcher(&self) -> SnapshotFetcher {
        SnapshotFetcher::new(self.services.store.clone())
    }

    pub fn subscriber(&self) -> Subscriber {
        Subscriber::new(self.services.realtime.clone(), &self.config)
    }

    pub fn viewer(&self) -> ClientResult<UserId> {
        self.session.current_user()
    }

    pub fn open_chat(&self) -> Option<ChatId> {
        self.open_chat.lock().ok().and_then(|c| *c)
    }

    pub(crate) fn set_open_chat(&self, chat: Option<ChatId>) {
        if let Ok(mut slot) = self.open_chat.lock() {
            *slot = chat;
        }
    }

    /// Clear the open chat only if it is still `chat`.
    pub(crate) fn clear_open_chat(&self, chat: ChatId) {
        if let Ok(mut slot) = self.open_chat.lock() {
            if *slot == Some(chat) {
                *slot = None;
            }
        }
    }
}
