//! # Operation Outcomes
//!
//! A successful mutation plus any warnings the caller must see.

use ledger_core::audit::{AuditOperation, EntityType};
use serde::{Deserialize, Serialize};

/// Non-fatal conditions attached to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerWarning {
    /// The business write committed but its audit record was not stored.
    AuditDegraded {
        entity_type: EntityType,
        entity_id: String,
        operation: AuditOperation,
        reason: String,
    },
}

/// Result of a mutating ledger operation.
///
/// ## Usage
/// ```rust,ignore
/// let outcome = ledger.installments().record_installment(&actor, input).await?;
/// if outcome.is_degraded() {
///     // show "saved, but the audit trail could not be written"
/// }
/// let recorded = outcome.into_value();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LedgerWarning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Outcome {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<LedgerWarning>) -> Self {
        Outcome { value, warnings }
    }

    /// True when any audit record of this operation was lost.
    pub fn is_degraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, LedgerWarning::AuditDegraded { .. }))
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_flag_and_serialization() {
        let clean = Outcome::new(1);
        assert!(!clean.is_degraded());
        assert_eq!(serde_json::to_value(&clean).unwrap(), serde_json::json!({"value": 1}));

        let degraded = Outcome::with_warnings(
            "ok",
            vec![LedgerWarning::AuditDegraded {
                entity_type: EntityType::Installment,
                entity_id: "i1".into(),
                operation: AuditOperation::Create,
                reason: "no such table: audit_log".into(),
            }],
        )
        .map(str::len);
        assert!(degraded.is_degraded());
        assert_eq!(degraded.value, 2);

        let json = serde_json::to_value(&degraded).unwrap();
        assert_eq!(json["warnings"][0]["type"], "audit_degraded");
        assert_eq!(json["warnings"][0]["entity_type"], "installment");
    }
}
