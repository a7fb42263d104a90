//! # Ledger Error Types
//!
//! The typed failures every ledger operation returns.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ledger Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  NotFound       │  │  Validation     │  │  Conflict               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  negotiation,   │  │  non-positive   │  │  AmountExceedsBalance   │ │
//! │  │  source,        │  │  amount, empty  │  │  SourceAlreadySettled   │ │
//! │  │  installment    │  │  motive, ...    │  │  InvalidTransition ...  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ Concurrency     │  │  Storage        │  │  Config                 │ │
//! │  │ Conflict        │  │                 │  │                         │ │
//! │  │ retries spent   │  │  DbError        │  │  ledger.toml / env      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  NotFound / Validation / Conflict abort before any write and are       │
//! │  returned verbatim. Busy and version errors are retried first.         │
//! │  Audit failures are never errors: see LedgerWarning::AuditDegraded.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ledger_core::{ConflictError, CoreError, ValidationError};
use ledger_db::DbError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Every failure a ledger operation can report.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The ledger's current state does not allow the operation.
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Lock contention or concurrent writes outlasted the retry budget.
    #[error("Concurrency conflict in {operation} after {attempts} attempt(s): {reason}")]
    ConcurrencyConflict {
        operation: String,
        attempts: u32,
        reason: String,
    },

    /// The storage layer failed.
    #[error("Storage error: {0}")]
    Storage(DbError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => LedgerError::Storage(other),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => LedgerError::Validation(e),
            CoreError::Conflict(e) => LedgerError::Conflict(e),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LedgerError {
    fn from(err: toml::ser::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if a fresh attempt of the same operation can succeed.
    ///
    /// ## Retryable Errors
    /// - Lock timeouts
    /// - Busy database, version mismatches, pool exhaustion
    /// - Reference-code uniqueness races
    ///
    /// ## Non-Retryable Errors
    /// - NotFound, Validation, Conflict: the answer won't change
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::ConcurrencyConflict { .. } => true,
            LedgerError::Storage(db) => db.is_retryable(),
            _ => false,
        }
    }

    /// True when a UNIQUE constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, LedgerError::Storage(db) if db.is_unique_violation())
    }

    /// The business-rule violation, if this is one.
    pub fn as_conflict(&self) -> Option<&ConflictError> {
        match self {
            LedgerError::Conflict(c) => Some(c),
            _ => None,
        }
    }

    /// Machine-readable category for the presentation layer.
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::NotFound { .. } => ErrorCode::NotFound,
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::Conflict(_) => ErrorCode::Conflict,
            LedgerError::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            LedgerError::Storage(_) => ErrorCode::StorageError,
            LedgerError::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Serializable form of the error.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

// =============================================================================
// Serializable Form
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    Conflict,
    ConcurrencyConflict,
    StorageError,
    ConfigError,
}

/// What the presentation layer receives for a failed call.
///
/// ```json
/// { "code": "CONFLICT", "message": "Conflict: Amount ... exceeds the remaining balance ..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<LedgerError> for ErrorBody {
    fn from(err: LedgerError) -> Self {
        err.body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{Money, NegotiationStatus};

    #[test]
    fn test_db_not_found_becomes_not_found() {
        let err: LedgerError = DbError::not_found("PaymentSource", "s1").into();
        assert!(matches!(err, LedgerError::NotFound { ref entity, .. } if entity == "PaymentSource"));
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LedgerError::from(DbError::Busy("database is locked".into())).is_retryable());
        assert!(LedgerError::from(DbError::version_conflict("Negotiation", "n1", 2)).is_retryable());
        assert!(LedgerError::from(DbError::duplicate("reference_code", "x")).is_unique_violation());

        let conflict = LedgerError::from(ConflictError::SourceAlreadySettled {
            source_id: "s1".into(),
        });
        assert!(!conflict.is_retryable());
        assert!(!LedgerError::from(ValidationError::required("motive")).is_retryable());
    }

    #[test]
    fn test_core_error_split() {
        let err: LedgerError = CoreError::from(ConflictError::InvalidTransition {
            from: NegotiationStatus::Completed,
            to: NegotiationStatus::Active,
        })
        .into();
        assert!(matches!(
            err.as_conflict(),
            Some(ConflictError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_error_body_serialization() {
        let err = LedgerError::from(ConflictError::AmountExceedsBalance {
            target: "payment source s1".into(),
            requested: Money::from_units(70),
            available: Money::from_units(60),
        });
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "CONFLICT");
        assert!(body["message"].as_str().unwrap().contains("exceeds the remaining balance"));
    }
}
