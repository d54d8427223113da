//! Errors produced by the instrumented PostgreSQL layer.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// SQLSTATE raised on a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur with the PostgreSQL pool.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error("Unable to connect to database {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error ({}): {message}", .code.as_deref().unwrap_or("unknown"))]
    Database {
        code: Option<String>,
        constraint: Option<String>,
        message: String,
    },

    #[error("No rows in result set")]
    NoRows,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transaction already closed")]
    TransactionClosed,

    #[error("Cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("SQLx error: {0}")]
    Sqlx(sqlx::Error),
}

impl DbError {
    /// SQLSTATE reported by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            DbError::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION)
    }

    pub fn is_no_rows(&self) -> bool {
        matches!(self, DbError::NoRows)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => DbError::Database {
                code: db.code().map(|c| c.into_owned()),
                constraint: db.constraint().map(str::to_owned),
                message: db.message().to_owned(),
            },
            sqlx::Error::RowNotFound => DbError::NoRows,
            sqlx::Error::ColumnDecode { index, source } => DbError::Decode {
                column: index,
                message: source.to_string(),
            },
            other => DbError::Sqlx(other),
        }
    }
}

/// Outcome of a failed [`with_transaction`](super::ConnectionPool::with_transaction).
///
/// `E` is the unit of work's own error type.
#[derive(Debug)]
pub enum TransactionError<E> {
    /// The transaction could not be started.
    Begin(DbError),
    /// The unit of work failed and the transaction was rolled back.
    Aborted(E),
    /// The unit of work failed and so did the rollback. The rollback error is
    /// the primary one; the unit of work's error is kept as `cause`.
    RollbackFailed { rollback: DbError, cause: E },
    /// The unit of work succeeded but the commit failed.
    Commit(DbError),
}

impl<E> TransactionError<E> {
    /// The unit of work's error, when there is one.
    pub fn cause(&self) -> Option<&E> {
        match self {
            TransactionError::Aborted(cause) | TransactionError::RollbackFailed { cause, .. } => {
                Some(cause)
            }
            _ => None,
        }
    }

    /// The database error, when the failure came from the database layer
    /// rather than from the unit of work.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            TransactionError::Begin(e)
            | TransactionError::Commit(e)
            | TransactionError::RollbackFailed { rollback: e, .. } => Some(e),
            TransactionError::Aborted(_) => None,
        }
    }

    pub fn into_cause(self) -> Option<E> {
        match self {
            TransactionError::Aborted(cause) | TransactionError::RollbackFailed { cause, .. } => {
                Some(cause)
            }
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for TransactionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Begin(e) => write!(f, "unable to start transaction: {}", e),
            TransactionError::Aborted(cause) => write!(f, "transaction rolled back: {}", cause),
            TransactionError::RollbackFailed { rollback, cause } => write!(
                f,
                "rollback failed: {} (unit of work error: {})",
                rollback, cause
            ),
            TransactionError::Commit(e) => write!(f, "commit failed: {}", e),
        }
    }
}

impl<E> std::error::Error for TransactionError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransactionError::Begin(e)
            | TransactionError::Commit(e)
            | TransactionError::RollbackFailed { rollback: e, .. } => Some(e),
            TransactionError::Aborted(cause) => Some(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection() {
        let err = DbError::Database {
            code: Some(UNIQUE_VIOLATION.to_string()),
            constraint: Some("client_email_key".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        };
        assert!(err.is_unique_violation());
        assert!(err.to_string().contains("23505"));

        let other = DbError::Database {
            code: Some("23503".to_string()),
            constraint: None,
            message: "foreign key violation".to_string(),
        };
        assert!(!other.is_unique_violation());
        assert!(!DbError::NoRows.is_unique_violation());
    }

    #[test]
    fn test_row_not_found_maps_to_no_rows() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(err.is_no_rows());
    }

    #[test]
    fn test_rollback_failed_keeps_both_errors() {
        let err: TransactionError<DbError> = TransactionError::RollbackFailed {
            rollback: DbError::Cancelled,
            cause: DbError::NoRows,
        };
        let text = err.to_string();
        assert!(text.contains("rollback failed"));
        assert!(text.contains("No rows"));
        assert!(matches!(err.db_error(), Some(DbError::Cancelled)));
        assert!(matches!(err.cause(), Some(DbError::NoRows)));
    }
}
