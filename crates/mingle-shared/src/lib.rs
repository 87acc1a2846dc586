//! Types shared by every Mingle crate: identifiers, the backend error
//! taxonomy, the change-event protocol and invitation helpers.

pub mod constants;
pub mod error;
pub mod invite;
pub mod protocol;
pub mod types;

pub use error::{BackendError, BackendResult, ErrorKind};
pub use protocol::{ChangeEvent, ChangeKind, Entity, Filter, Table, Topic};
pub use types::{ChatId, InvitationId, MessageId, ReactionId, UserId};
