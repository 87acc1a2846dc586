use thiserror::Error;

use mingle_shared::BackendError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (database directory, object files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The acting user may not perform this write.
    #[error("Access denied")]
    AccessDenied,

    /// Input rejected before touching the database.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    /// Password hashing failure.
    #[error("Credential error: {0}")]
    Credential(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => BackendError::NotFound("record".into()),
            StoreError::AccessDenied => BackendError::AccessDenied,
            StoreError::Invalid(msg) => BackendError::Invalid(msg),
            StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => {
                BackendError::NotFound("record".into())
            }
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                constraint_error(code.extended_code, msg)
            }
            other => BackendError::Transient(other.to_string()),
        }
    }
}

/// Unique/primary-key violations are conflicts; a dangling foreign key means
/// the referenced parent row is gone.
fn constraint_error(extended_code: i32, msg: Option<String>) -> BackendError {
    let detail = msg.unwrap_or_else(|| "constraint violation".to_string());
    match extended_code {
        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => BackendError::NotFound(detail),
        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            BackendError::Conflict(detail)
        }
        _ => BackendError::Invalid(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy() {
        assert_eq!(
            BackendError::from(StoreError::AccessDenied),
            BackendError::AccessDenied
        );
        assert!(matches!(
            BackendError::from(StoreError::NotFound),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            BackendError::from(StoreError::Io(std::io::Error::other("disk"))),
            BackendError::Transient(_)
        ));
    }

    #[test]
    fn unique_violation_is_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(matches!(
            BackendError::from(StoreError::from(err)),
            BackendError::Conflict(_)
        ));
    }
}
