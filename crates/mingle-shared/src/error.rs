use thiserror::Error;

/// Outcome of a failed call into one of the backend collaborators.
///
/// The variants form the error taxonomy every layer above the backend
/// reasons about: whether to retry, whether to show a terminal state, and
/// whether a failure is really a benign duplicate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A referenced row (usually the parent chat) no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The authorization policy rejected the caller. Carries no cause.
    #[error("Access denied")]
    AccessDenied,

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network or backend hiccup; the same call may succeed later.
    #[error("Backend unavailable: {0}")]
    Transient(String),

    /// The request was rejected before reaching the backend.
    #[error("Invalid input: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Conflict,
    Transient,
    Invalid,
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied => ErrorKind::AccessDenied,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Invalid(_) => ErrorKind::Invalid,
        }
    }

    /// Only transient failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InviteError {
    #[error("Invalid email format: {}", .0.join(", "))]
    InvalidEmails(Vec<String>),

    #[error("No email addresses given")]
    Empty,

    #[error("Not an invitation link: {0}")]
    InvalidLink(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(BackendError::Transient("timeout".into()).is_retryable());
        assert!(!BackendError::NotFound("chat".into()).is_retryable());
        assert!(!BackendError::AccessDenied.is_retryable());
        assert!(!BackendError::Conflict("dup".into()).is_retryable());
    }

    #[test]
    fn access_denied_does_not_leak_cause() {
        assert_eq!(BackendError::AccessDenied.to_string(), "Access denied");
    }

    #[test]
    fn invalid_emails_are_listed() {
        let err = InviteError::InvalidEmails(vec!["a@".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid email format: a@, b");
    }
}
