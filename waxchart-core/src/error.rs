//! Common error types for the waxchart ledger core

use thiserror::Error;

/// Common result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the position & achievement ledger
///
/// `InsufficientBalance` and `ConcurrencyConflict` are expected runtime
/// outcomes, not faults: a debit may bounce, and a serialization failure is
/// the caller's cue to retry. Nothing in this crate retries internally.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed subject/account reference
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Referenced subject or account does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A transactional step could not be serialized; caller retries
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// A debit exceeded the current balance; nothing was written
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for serialization failures the caller should retry with backoff
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict(_))
    }
}

// SQLite reports lock contention as BUSY/LOCKED (primary codes 5 and 6,
// plus their extended forms). Those are serialization failures, not faults,
// so they surface as ConcurrencyConflict for the caller to retry.
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            let code_busy = matches!(
                db.code().as_deref(),
                Some("5") | Some("6") | Some("261") | Some("262") | Some("517")
            );
            let message_busy = db.message().contains("database is locked")
                || db.message().contains("database table is locked");
            if code_busy || message_busy {
                return Error::ConcurrencyConflict(db.message().to_string());
            }
        }
        Error::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_formats_both_amounts() {
        let err = Error::InsufficientBalance {
            requested: 50,
            available: 40,
        };
        let msg = err.to_string();
        assert!(msg.contains("50"));
        assert!(msg.contains("40"));
    }

    #[test]
    fn conflict_predicate_matches_only_conflicts() {
        assert!(Error::ConcurrencyConflict("locked".into()).is_concurrency_conflict());
        assert!(!Error::NotFound("subject".into()).is_concurrency_conflict());
    }

    #[test]
    fn row_not_found_maps_to_database_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
