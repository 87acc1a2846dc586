//! User-initiated operations.
//!
//! Each sub-module groups related operations by domain. Every operation
//! acts on behalf of the signed-in user of the given [`AppState`] and fails
//! with `NotSignedIn` without one.
//!
//! [`AppState`]: crate::state::AppState

pub mod chats;
pub mod invitations;
pub mod messaging;
pub mod profile;
pub mod push;
pub mod reactions;
