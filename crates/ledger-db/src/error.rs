//! # Storage Errors
//!
//! Categorized failures of the ledger's SQLite layer.
//!
//! ## Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError                                                                │
//! │   ├── NotFound                 → LedgerError::NotFound                  │
//! │   ├── Busy / PoolExhausted     ┐                                        │
//! │   ├── VersionConflict          ├ retried by the engine                  │
//! │   ├── UniqueViolation          ┘ (reference-code races)                 │
//! │   └── everything else          → LedgerError::Storage                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// No row with this id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the row, e.g. two installments of one
    /// negotiation ending up with the same reference code.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// The row points at a negotiation or source that does not exist, or a
    /// source with installments was about to be deleted.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// `UPDATE ... WHERE version = ?` matched nothing: someone else wrote
    /// the row after it was read.
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: String,
        id: String,
        expected: i64,
    },

    /// SQLITE_BUSY / SQLITE_LOCKED outlasted the busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A CHECK constraint or trigger refused the statement, or the schema
    /// is damaged (missing table).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// No pooled connection became free within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn version_conflict(entity: impl Into<String>, id: impl Into<String>, expected: i64) -> Self {
        DbError::VersionConflict {
            entity: entity.into(),
            id: id.into(),
            expected,
        }
    }

    /// True when a fresh attempt of the same write can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_)
                | DbError::VersionConflict { .. }
                | DbError::PoolExhausted
                | DbError::UniqueViolation { .. }
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// Classifies a SQLite error message.
    ///
    /// SQLite reports constraint failures only through the message text:
    /// `UNIQUE constraint failed: installments.negotiation_id, installments.reference_code`.
    fn from_sqlite_message(msg: &str) -> Self {
        if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
            DbError::UniqueViolation {
                field: columns.to_string(),
                value: "unknown".to_string(),
            }
        } else if msg.contains("FOREIGN KEY constraint failed") {
            DbError::ForeignKeyViolation {
                message: msg.to_string(),
            }
        } else if msg.contains("database is locked") || msg.contains("table is locked") {
            DbError::Busy(msg.to_string())
        } else {
            DbError::QueryFailed(msg.to_string())
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_sqlite_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sqlite_message_classification() {
        let err = DbError::from_sqlite_message(
            "UNIQUE constraint failed: installments.negotiation_id, installments.reference_code",
        );
        assert!(matches!(
            &err,
            DbError::UniqueViolation { field, .. } if field.ends_with("installments.reference_code")
        ));
        assert!(matches!(
            DbError::from_sqlite_message("FOREIGN KEY constraint failed"),
            DbError::ForeignKeyViolation { .. }
        ));
        assert!(DbError::from_sqlite_message("database is locked").is_retryable());
        assert!(matches!(
            DbError::from_sqlite_message("no such table: audit_log"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(DbError::version_conflict("Negotiation", "n1", 3).is_retryable());
        assert!(DbError::duplicate("reference_code", "ABO-2026-10-001").is_unique_violation());
        assert!(!DbError::not_found("Negotiation", "n1").is_retryable());
        assert!(!DbError::QueryFailed("CHECK constraint failed".into()).is_retryable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            DbError::version_conflict("Negotiation", "n1", 3).to_string(),
            "Negotiation n1 was modified concurrently (expected version 3)"
        );
        assert_eq!(
            DbError::not_found("PaymentSource", "s1").to_string(),
            "PaymentSource not found: s1"
        );
    }
}
