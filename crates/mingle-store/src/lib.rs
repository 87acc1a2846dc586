//! # mingle-store
//!
//! Domain rows and the backend collaborators of the Mingle client core.
//!
//! The collaborator traits in [`backend`] are what the client talks to.
//! [`LocalBackend`] is a complete in-process implementation of them backed
//! by SQLite, an in-memory change feed and a filesystem object store, used for local runs and by
//! the tests of every crate in the workspace.

pub mod backend;
pub mod chats;
pub mod credentials;
pub mod database;
pub mod feed;
pub mod invitations;
pub mod local;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod objects;
pub mod participants;
pub mod reactions;
pub mod users;

mod error;

#[cfg(test)]
mod fixtures;

pub use backend::{
    AuthProvider, ChangeStream, DataStore, ObjectStorage, PushGateway, PushNotification, Realtime,
    ServiceStore, StreamError,
};
pub use database::Database;
pub use error::StoreError;
pub use local::{LocalBackend, LocalSession};
pub use models::*;
