use thiserror::Error;

use mingle_shared::BackendError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("{service} rejected the request with status {status}")]
    Rejected { service: &'static str, status: u16 },
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl From<RelayError> for BackendError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Backend(e) => e,
            RelayError::Rejected { status, .. } if (400..500).contains(&status) && status != 429 => {
                BackendError::Invalid(err.to_string())
            }
            other => BackendError::Transient(other.to_string()),
        }
    }
}
