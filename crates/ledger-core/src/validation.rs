//! # Validation Module
//!
//! Input validation for every ledger mutation.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation                                                 │
//! │  └── Immediate feedback on forms                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: ledger-engine services                                       │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: amounts, motives, per-kind source fields             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on amounts                                      │
//! │  ├── UNIQUE (negotiation_id, reference_code)                           │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators that accept free text return the trimmed value so callers
//! store exactly what was checked.

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::SourceKind;
use crate::{MAX_ENTITY_LENGTH, MAX_MOTIVE_LENGTH, MAX_NOTES_LENGTH, MAX_REFERENCE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates that an amount is strictly positive.
///
/// ## Example
/// ```rust
/// use ledger_core::money::Money;
/// use ledger_core::validation::validate_positive_amount;
///
/// assert!(validate_positive_amount("amount", Money::from_cents(1)).is_ok());
/// assert!(validate_positive_amount("amount", Money::zero()).is_err());
/// ```
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a signed adjustment amount (any sign, never zero).
pub fn validate_adjustment_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_zero() {
        return Err(ValidationError::MustNotBeZero {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates negotiated price and discount.
///
/// ## Rules
/// - price >= 0
/// - discount >= 0
/// - a zero discount is always accepted
/// - otherwise discount < price
///
/// ## Returns
/// The total (price - discount).
pub fn validate_price_and_discount(price: Money, discount: Money) -> ValidationResult<Money> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "negotiated_price".to_string(),
        });
    }
    if discount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "discount".to_string(),
        });
    }
    if !discount.is_zero() && discount >= price {
        return Err(ValidationError::DiscountTooLarge { discount, price });
    }
    Ok(price - discount)
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a suspension, renunciation or cancellation motive.
///
/// ## Example
/// ```rust
/// use ledger_core::validation::validate_motive;
///
/// assert_eq!(validate_motive("  client travel ").unwrap(), "client travel");
/// assert!(validate_motive("   ").is_err());
/// ```
pub fn validate_motive(motive: &str) -> ValidationResult<String> {
    required_text("motive", motive, MAX_MOTIVE_LENGTH)
}

/// Validates an adjustment reason. Same rules as a motive.
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    required_text("reason", reason, MAX_MOTIVE_LENGTH)
}

/// Validates the motive given for a change of terms or sources.
pub fn validate_change_motive(motive: &str) -> ValidationResult<String> {
    required_text("change_motive", motive, MAX_MOTIVE_LENGTH)
}

/// Validates free-text notes.
///
/// ## Returns
/// The trimmed notes, or None when blank.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    optional_text("notes", notes, MAX_NOTES_LENGTH)
}

/// Validates a payer's bank/transfer reference.
pub fn validate_external_reference(reference: Option<&str>) -> ValidationResult<Option<String>> {
    optional_text("external_reference", reference, MAX_REFERENCE_LENGTH)
}

/// Validates an id supplied by a caller.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    uuid::Uuid::parse_str(id).map_err(|e| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Validates the actor stamped on audit records.
pub fn validate_actor(actor_id: &str, actor_role: &str) -> ValidationResult<()> {
    if actor_id.trim().is_empty() {
        return Err(ValidationError::required("actor_id"));
    }
    if actor_role.trim().is_empty() {
        return Err(ValidationError::required("actor_role"));
    }
    Ok(())
}

/// Validates a reference-code prefix.
///
/// ## Rules
/// - 1 to 10 characters
/// - ASCII uppercase letters and digits only (no `-`, it separates fields)
pub fn validate_reference_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::required("reference_prefix"));
    }
    if prefix.len() > 10 {
        return Err(ValidationError::TooLong {
            field: "reference_prefix".to_string(),
            max: 10,
        });
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "reference_prefix".to_string(),
            reason: "must contain only uppercase letters and digits".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Payment Source Fields
// =============================================================================

/// Normalized entity / reference pair of a payment source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFields {
    pub entity: Option<String>,
    pub reference_number: Option<String>,
}

/// Validates the entity and reference number required by a source kind.
///
/// ## Example
/// ```rust
/// use ledger_core::types::SourceKind;
/// use ledger_core::validation::validate_source_fields;
///
/// assert!(validate_source_fields(SourceKind::MortgageLoan, Some("Bank"), Some("HL-1")).is_ok());
/// assert!(validate_source_fields(SourceKind::MortgageLoan, Some("Bank"), None).is_err());
/// assert!(validate_source_fields(SourceKind::InitialDownPayment, None, None).is_ok());
/// ```
pub fn validate_source_fields(
    kind: SourceKind,
    entity: Option<&str>,
    reference_number: Option<&str>,
) -> ValidationResult<SourceFields> {
    let entity = optional_text("entity", entity, MAX_ENTITY_LENGTH)?;
    let reference_number = optional_text("reference_number", reference_number, MAX_REFERENCE_LENGTH)?;

    if kind.requires_entity() && entity.is_none() {
        return Err(ValidationError::required("entity"));
    }
    if kind.requires_reference() && reference_number.is_none() {
        return Err(ValidationError::required("reference_number"));
    }

    Ok(SourceFields {
        entity,
        reference_number,
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn required_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value.to_string())
}

fn optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        Some(v) => Ok(Some(v.to_string())),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_amount() {
        assert!(validate_positive_amount("amount", Money::from_cents(1)).is_ok());
        assert!(matches!(
            validate_positive_amount("amount", Money::zero()),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_positive_amount("amount", Money::from_cents(-5)).is_err());
    }

    #[test]
    fn test_validate_adjustment_amount() {
        assert!(validate_adjustment_amount(Money::from_cents(-5)).is_ok());
        assert!(validate_adjustment_amount(Money::from_cents(5)).is_ok());
        assert!(validate_adjustment_amount(Money::zero()).is_err());
    }

    #[test]
    fn test_validate_price_and_discount() {
        let price = Money::from_units(100_000_000);
        assert_eq!(
            validate_price_and_discount(price, Money::from_units(5_000_000)).unwrap(),
            Money::from_units(95_000_000)
        );
        assert_eq!(validate_price_and_discount(price, Money::zero()).unwrap(), price);

        // Zero discount on a zero price is fine
        assert_eq!(
            validate_price_and_discount(Money::zero(), Money::zero()).unwrap(),
            Money::zero()
        );

        assert!(matches!(
            validate_price_and_discount(price, price),
            Err(ValidationError::DiscountTooLarge { .. })
        ));
        assert!(validate_price_and_discount(Money::from_cents(-1), Money::zero()).is_err());
        assert!(validate_price_and_discount(price, Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_validate_motive() {
        assert_eq!(validate_motive("  bank delay  ").unwrap(), "bank delay");
        assert_eq!(validate_motive(""), Err(ValidationError::required("motive")));
        assert!(validate_motive(&"x".repeat(MAX_MOTIVE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_change_motive() {
        assert_eq!(validate_change_motive(" appraisal ").unwrap(), "appraisal");
        assert_eq!(
            validate_change_motive("\t"),
            Err(ValidationError::required("change_motive"))
        );
    }

    #[test]
    fn test_validate_notes() {
        assert_eq!(validate_notes(None).unwrap(), None);
        assert_eq!(validate_notes(Some("   ")).unwrap(), None);
        assert_eq!(validate_notes(Some(" hi ")).unwrap(), Some("hi".to_string()));
        assert!(validate_notes(Some(&"x".repeat(MAX_NOTES_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_validate_source_fields_per_kind() {
        // Mortgage needs both
        assert_eq!(
            validate_source_fields(SourceKind::MortgageLoan, None, Some("HL-1")),
            Err(ValidationError::required("entity"))
        );
        assert_eq!(
            validate_source_fields(SourceKind::MortgageLoan, Some("Bank"), Some("  ")),
            Err(ValidationError::required("reference_number"))
        );

        // National subsidy needs a reference only
        assert!(validate_source_fields(SourceKind::NationalHousingSubsidy, None, Some("R-9")).is_ok());
        assert!(validate_source_fields(SourceKind::NationalHousingSubsidy, Some("Agency"), None).is_err());

        // Compensation fund needs an entity only
        assert!(validate_source_fields(SourceKind::CompensationFundSubsidy, Some("Fund"), None).is_ok());
        assert!(validate_source_fields(SourceKind::CompensationFundSubsidy, None, Some("R")).is_err());

        let fields =
            validate_source_fields(SourceKind::InitialDownPayment, Some(" Buyer "), None).unwrap();
        assert_eq!(fields.entity.as_deref(), Some("Buyer"));
        assert_eq!(fields.reference_number, None);
    }

    #[test]
    fn test_validate_id_and_actor() {
        assert!(validate_id("negotiation_id", &uuid::Uuid::new_v4().to_string()).is_ok());
        assert!(validate_id("negotiation_id", "nope").is_err());
        assert!(validate_id("negotiation_id", "").is_err());

        assert!(validate_actor("user-1", "advisor").is_ok());
        assert!(validate_actor("", "advisor").is_err());
        assert!(validate_actor("user-1", " ").is_err());
    }

    #[test]
    fn test_validate_reference_prefix() {
        assert!(validate_reference_prefix("ABO").is_ok());
        assert!(validate_reference_prefix("PAY2").is_ok());
        assert!(validate_reference_prefix("").is_err());
        assert!(validate_reference_prefix("AB-O").is_err());
        assert!(validate_reference_prefix("abo").is_err());
        assert!(validate_reference_prefix("ABCDEFGHIJK").is_err());
    }
}
