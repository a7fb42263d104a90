//! # Error Types
//!
//! Domain-specific error types for ledger-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ledger-core errors (this file)                                        │
//! │  ├── CoreError        - Either of the two below                        │
//! │  ├── ValidationError  - Malformed input                                │
//! │  └── ConflictError    - Business rule violation                        │
//! │                                                                         │
//! │  ledger-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  ledger-engine errors                                                  │
//! │  └── LedgerError      - What callers see (NotFound, Validation,        │
//! │                         Conflict, ConcurrencyConflict, ...)            │
//! │                                                                         │
//! │  Flow: ValidationError / ConflictError → CoreError → LedgerError       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (ids, amounts, states)
//! 3. Errors are enum variants, never String
//! 4. Every rejection happens before any persistent write

use thiserror::Error;

use crate::money::Money;
use crate::types::NegotiationStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Any rejection produced by the pure ledger rules.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),
}

// =============================================================================
// Conflict Error
// =============================================================================

/// Business-rule violations: the input is well formed but the current
/// ledger state does not allow the operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConflictError {
    /// Recording would push a source (or the negotiation) past its limit.
    ///
    /// ## User Workflow
    /// ```text
    /// Mortgage approved 60,000,000, received 0
    ///      │
    ///      ▼
    /// Record 70,000,000
    ///      │
    ///      ▼
    /// AmountExceedsBalance { requested: 70,000,000, available: 60,000,000 }
    ///      │
    ///      ▼
    /// UI shows: "this amount exceeds the remaining balance for this source"
    /// ```
    #[error("Amount {requested} exceeds the remaining balance {available} of {target}")]
    AmountExceedsBalance {
        target: String,
        requested: Money,
        available: Money,
    },

    /// A single-disbursement source already has its disbursement.
    #[error("Payment source {source_id} only allows one disbursement and already has it")]
    SourceAlreadySettled { source_id: String },

    /// The negotiation cannot take installments in its current state.
    #[error("Negotiation {negotiation_id} is {status} and cannot receive payments")]
    NegotiationNotPayable {
        negotiation_id: String,
        status: NegotiationStatus,
    },

    /// Sources are frozen once financing is underway.
    #[error("Payment sources of negotiation {negotiation_id} are frozen while it is {status}")]
    SourcesFrozen {
        negotiation_id: String,
        status: NegotiationStatus,
    },

    /// Price, discount and notes may only change while drafting.
    #[error("Terms of negotiation {negotiation_id} cannot change while it is {status}")]
    TermsFrozen {
        negotiation_id: String,
        status: NegotiationStatus,
    },

    /// Money has already been recorded against the source.
    #[error("Payment source {source_id} already received {received}")]
    SourceHasDisbursements { source_id: String, received: Money },

    /// The requested (from, to) pair is not in the transition table.
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: NegotiationStatus,
        to: NegotiationStatus,
    },

    /// The pair is in the table but its guard does not hold.
    #[error("Transition from {from} to {to} not allowed: {reason}")]
    TransitionNotAllowed {
        from: NegotiationStatus,
        to: NegotiationStatus,
        reason: String,
    },

    /// The client already has an open negotiation for this unit.
    #[error("Client {client_id} already has open negotiation {existing_id} for unit {housing_unit_id}")]
    DuplicateOpenNegotiation {
        client_id: String,
        housing_unit_id: String,
        existing_id: String,
    },

    /// All 999 reference codes of a negotiation/month are used.
    #[error("No reference codes left for negotiation {negotiation_id} in {year}-{month:02}")]
    ReferenceSpaceExhausted {
        negotiation_id: String,
        year: i32,
        month: u32,
    },

    /// The payment source belongs to a different negotiation.
    #[error("Payment source {source_id} does not belong to negotiation {negotiation_id}")]
    SourceNegotiationMismatch {
        source_id: String,
        negotiation_id: String,
    },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustNotBeZero { field: String },

    /// Discount must stay below the negotiated price.
    #[error("Discount {discount} must be less than the negotiated price {price}")]
    DiscountTooLarge { discount: Money, price: Money },

    /// A correction would take a balance below zero.
    #[error("{field} would become negative ({result})")]
    WouldBecomeNegative { field: String, result: Money },

    /// Invalid format (e.g., invalid UUID, invalid reference code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_messages() {
        let err = ConflictError::AmountExceedsBalance {
            target: "payment source src-1".to_string(),
            requested: Money::from_units(70_000_000),
            available: Money::from_units(60_000_000),
        };
        assert_eq!(
            err.to_string(),
            "Amount $70,000,000.00 exceeds the remaining balance $60,000,000.00 of payment source src-1"
        );

        let err = ConflictError::InvalidTransition {
            from: NegotiationStatus::Completed,
            to: NegotiationStatus::Active,
        };
        assert_eq!(err.to_string(), "Cannot transition from completed to active");

        let err = ConflictError::ReferenceSpaceExhausted {
            negotiation_id: "n-1".to_string(),
            year: 2026,
            month: 3,
        };
        assert_eq!(
            err.to_string(),
            "No reference codes left for negotiation n-1 in 2026-03"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("motive");
        assert_eq!(err.to_string(), "motive is required");

        let err = ValidationError::MustBePositive {
            field: "approved_amount".to_string(),
        };
        assert_eq!(err.to_string(), "approved_amount must be positive");
    }

    #[test]
    fn test_conversions_into_core_error() {
        let core: CoreError = ValidationError::required("entity").into();
        assert!(matches!(core, CoreError::Validation(_)));

        let core: CoreError = ConflictError::SourceAlreadySettled {
            source_id: "s".to_string(),
        }
        .into();
        assert!(matches!(core, CoreError::Conflict(_)));
    }
}
