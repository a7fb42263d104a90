//! # Negotiation Versions
//!
//! Numbered snapshots of a negotiation's financial terms.
//!
//! ## Version Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  v1 initial_creation     price 100M  discount 0   sources []           │
//! │  v2 source_modification  price 100M  discount 0   sources [mortgage]   │
//! │  v3 discount_applied     price 100M  discount 5M  sources [mortgage]   │
//! │  ▲                                                                      │
//! │  └── exactly one version per negotiation is active (the latest)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every edit of price, discount or payment sources closes the active
//! version and opens the next one, together with the kind of change and the
//! motive the actor gave for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::audit::{compute_diff, FieldChange};
use crate::money::Money;
use crate::types::{Negotiation, PaymentSource, SourceKind, SourceStatus};

/// Versions returned by a history query when no limit is given.
pub const DEFAULT_VERSION_HISTORY_LIMIT: u32 = 50;

// =============================================================================
// Change Type
// =============================================================================

/// Why a new version of the terms was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The terms the negotiation was opened with.
    InitialCreation,
    /// A payment source was added, removed or re-approved.
    SourceModification,
    DiscountApplied,
    /// The housing unit was re-appraised and the price moved.
    AppraisalAdjustment,
    /// The bank, fund or agency behind a source changed.
    EntityChange,
    #[default]
    Other,
}

impl ChangeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeType::InitialCreation => "initial_creation",
            ChangeType::SourceModification => "source_modification",
            ChangeType::DiscountApplied => "discount_applied",
            ChangeType::AppraisalAdjustment => "appraisal_adjustment",
            ChangeType::EntityChange => "entity_change",
            ChangeType::Other => "other",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// The funding side of a payment source as it stood in a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SourceSnapshot {
    pub source_id: String,
    pub kind: SourceKind,
    pub approved_amount_cents: i64,
    pub entity: Option<String>,
    pub reference_number: Option<String>,
    pub status: SourceStatus,
}

impl From<&PaymentSource> for SourceSnapshot {
    fn from(source: &PaymentSource) -> Self {
        SourceSnapshot {
            source_id: source.id.clone(),
            kind: source.kind,
            approved_amount_cents: source.approved_amount_cents,
            entity: source.entity.clone(),
            reference_number: source.reference_number.clone(),
            status: source.status,
        }
    }
}

/// One numbered version of a negotiation's financial terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NegotiationVersion {
    pub id: String,
    pub negotiation_id: String,

    /// 1 for the terms at creation, then +1 per change.
    pub version_number: i64,

    pub negotiated_price_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,

    pub sources: Vec<SourceSnapshot>,

    pub change_type: ChangeType,
    pub change_motive: String,
    pub recorded_by: String,

    /// Only the latest version of a negotiation is active.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl NegotiationVersion {
    /// Snapshots `negotiation` and its current `sources` as the active
    /// version `version_number`.
    #[allow(clippy::too_many_arguments)]
    pub fn capture(
        id: String,
        negotiation: &Negotiation,
        sources: &[PaymentSource],
        version_number: i64,
        change_type: ChangeType,
        change_motive: String,
        recorded_by: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        NegotiationVersion {
            id,
            negotiation_id: negotiation.id.clone(),
            version_number,
            negotiated_price_cents: negotiation.negotiated_price_cents,
            discount_cents: negotiation.discount_cents,
            total_cents: negotiation.total_cents,
            sources: sources.iter().map(SourceSnapshot::from).collect(),
            change_type,
            change_motive,
            recorded_by,
            is_active: true,
            created_at,
        }
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of the approved amounts in the snapshot.
    pub fn approved_sum(&self) -> Money {
        self.sources
            .iter()
            .map(|s| Money::from_cents(s.approved_amount_cents))
            .sum()
    }

    /// The compared part of a version: terms and sources, no bookkeeping.
    fn terms(&self) -> serde_json::Value {
        json!({
            "negotiated_price_cents": self.negotiated_price_cents,
            "discount_cents": self.discount_cents,
            "total_cents": self.total_cents,
            "sources": self.sources,
        })
    }
}

// =============================================================================
// Comparison
// =============================================================================

/// What changed between two versions of the same negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VersionComparison {
    pub negotiation_id: String,
    pub from_version: i64,
    pub to_version: i64,

    /// Changed keys among `negotiated_price_cents`, `discount_cents`,
    /// `total_cents` and `sources`.
    pub changes: BTreeMap<String, FieldChange>,

    pub sources_before: u32,
    pub sources_after: u32,
}

impl VersionComparison {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compares the terms of two versions, `from` taken as the older one.
pub fn compare_versions(from: &NegotiationVersion, to: &NegotiationVersion) -> VersionComparison {
    VersionComparison {
        negotiation_id: to.negotiation_id.clone(),
        from_version: from.version_number,
        to_version: to.version_number,
        changes: compute_diff(&from.terms(), &to.terms()),
        sources_before: from.sources.len() as u32,
        sources_after: to.sources.len() as u32,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NegotiationStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    fn negotiation(price: i64, discount: i64) -> Negotiation {
        Negotiation {
            id: "neg-1".to_string(),
            client_id: "c".to_string(),
            housing_unit_id: "u".to_string(),
            negotiated_price_cents: price,
            discount_cents: discount,
            total_cents: price - discount,
            total_paid_cents: 0,
            balance_due_cents: price - discount,
            percent_paid_bps: 0,
            notes: None,
            status: NegotiationStatus::Drafting,
            cancellation_reason: None,
            cancelled_at: None,
            financial_closing_at: None,
            activated_at: None,
            completed_at: None,
            created_at: now(),
            updated_at: now(),
            version: 1,
        }
    }

    fn mortgage(approved: i64) -> PaymentSource {
        PaymentSource {
            id: "src-1".to_string(),
            negotiation_id: "neg-1".to_string(),
            kind: SourceKind::MortgageLoan,
            approved_amount_cents: approved,
            received_amount_cents: 0,
            entity: Some("Bank".to_string()),
            reference_number: Some("HL-1".to_string()),
            allows_multiple_disbursements: false,
            status: SourceStatus::Pending,
            completed_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn version(number: i64, neg: &Negotiation, sources: &[PaymentSource], change: ChangeType) -> NegotiationVersion {
        NegotiationVersion::capture(
            format!("v{number}"),
            neg,
            sources,
            number,
            change,
            "test".to_string(),
            "user-1".to_string(),
            now(),
        )
    }

    #[test]
    fn test_capture_snapshots_terms_and_sources() {
        let v = version(2, &negotiation(10_000, 500), &[mortgage(9_500)], ChangeType::SourceModification);
        assert!(v.is_active);
        assert_eq!(v.total(), Money::from_cents(9_500));
        assert_eq!(v.approved_sum(), Money::from_cents(9_500));
        assert_eq!(v.sources[0].entity.as_deref(), Some("Bank"));
    }

    #[test]
    fn test_compare_reports_only_changed_terms() {
        let v1 = version(1, &negotiation(10_000, 0), &[mortgage(10_000)], ChangeType::InitialCreation);
        let v2 = version(2, &negotiation(10_000, 1_000), &[mortgage(10_000)], ChangeType::DiscountApplied);

        let cmp = compare_versions(&v1, &v2);
        assert_eq!((cmp.from_version, cmp.to_version), (1, 2));
        assert!(cmp.changes.contains_key("discount_cents"));
        assert!(cmp.changes.contains_key("total_cents"));
        assert!(!cmp.changes.contains_key("negotiated_price_cents"));
        assert!(!cmp.changes.contains_key("sources"));

        let v3 = version(3, &negotiation(10_000, 1_000), &[mortgage(9_000)], ChangeType::SourceModification);
        let cmp = compare_versions(&v2, &v3);
        assert_eq!(cmp.changes.keys().collect::<Vec<_>>(), vec!["sources"]);
        assert!(compare_versions(&v3, &v3).is_unchanged());
    }

    #[test]
    fn test_change_type_names() {
        assert_eq!(ChangeType::default(), ChangeType::Other);
        assert_eq!(ChangeType::DiscountApplied.to_string(), "discount_applied");
        let json = serde_json::to_string(&ChangeType::AppraisalAdjustment).unwrap();
        assert_eq!(json, "\"appraisal_adjustment\"");
    }
}
