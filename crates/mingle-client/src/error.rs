use thiserror::Error;

use mingle_shared::error::InviteError;
use mingle_shared::{BackendError, ErrorKind};

/// Errors surfaced by client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Invite(#[from] InviteError),

    /// The operation needs an active session.
    #[error("Not signed in")]
    NotSignedIn,

    /// A previous send on the same screen has not finished.
    #[error("A message is already being sent")]
    SendInProgress,

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

impl ClientError {
    /// Position of this error in the backend taxonomy. Local validation
    /// failures count as `Invalid`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend(e) => e.kind(),
            Self::NotSignedIn => ErrorKind::AccessDenied,
            Self::SendInProgress => ErrorKind::Conflict,
            Self::Invite(_)
            | Self::FileTooLarge { .. }
            | Self::UnsupportedFileType(_)
            | Self::Invalid(_) => ErrorKind::Invalid,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_retryable())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
