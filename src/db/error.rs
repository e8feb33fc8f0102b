use thiserror::Error;

use crate::models::EntityKind;

/// Failures surfaced by store operations.
///
/// `TransactionFailure` keeps the underlying driver error as its source so it
/// can be logged; callers outside the store should never show it verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{field} references {target} '{id}', which does not exist")]
    ForeignKeyViolation {
        field: String,
        target: EntityKind,
        id: String,
    },

    #[error("transaction failed")]
    TransactionFailure(#[source] rusqlite::Error),

    #[error("store stayed busy after {attempts} attempts")]
    ConcurrencyBusy { attempts: u32 },
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the store reported contention (locked or busy) rather than a
    /// genuine failure. Such operations are safe to retry from scratch.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::TransactionFailure(err) => is_busy(err),
            Self::ConcurrencyBusy { .. } => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::TransactionFailure(err)
    }
}

pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_locked_count_as_contention() {
        assert!(is_busy(&sqlite_failure(rusqlite::ffi::SQLITE_BUSY)));
        assert!(is_busy(&sqlite_failure(rusqlite::ffi::SQLITE_LOCKED)));
        assert!(!is_busy(&sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT)));
    }

    #[test]
    fn transaction_failure_hides_driver_text() {
        let err = StoreError::from(sqlite_failure(rusqlite::ffi::SQLITE_IOERR));
        assert_eq!(err.to_string(), "transaction failed");
        assert!(!err.is_busy());
    }
}
