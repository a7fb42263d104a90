//! # Ledger Entities
//!
//! The data model of the negotiation ledger.
//!
//! ## Entity Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Entities                                 │
//! │                                                                         │
//! │  ┌──────────────────────┐                                               │
//! │  │     Negotiation      │  client + housing unit + agreed price        │
//! │  │  ──────────────────  │                                               │
//! │  │  total = price - disc│                                               │
//! │  │  total_paid (derived)│                                               │
//! │  │  balance_due (der.)  │                                               │
//! │  │  status / version    │                                               │
//! │  └──────────┬───────────┘                                               │
//! │             │ 1..n (composition)                                        │
//! │  ┌──────────▼───────────┐        ┌──────────────────────┐              │
//! │  │    PaymentSource     │ 1..n   │     Installment      │              │
//! │  │  ──────────────────  ├───────►│  ──────────────────  │              │
//! │  │  kind                │        │  reference_code      │              │
//! │  │  approved / received │        │  amount (signed for  │              │
//! │  │  status              │        │    adjustments)      │              │
//! │  └──────────────────────┘        │  append-only         │              │
//! │                                  └──────────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Convention
//! Money columns are stored as `*_cents: i64` and exposed through `Money`
//! accessors, so entities map one-to-one onto their table rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Percentage
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 6000 bps = 60% paid, 10000 bps = fully paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percentage(u32);

impl Percentage {
    /// 100%.
    pub const FULL_BPS: u32 = 10_000;

    /// Creates a percentage from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percentage(bps)
    }

    /// Returns the value in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the value as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Percentage(0)
    }

    #[inline]
    pub const fn full() -> Self {
        Percentage(Self::FULL_BPS)
    }

    /// True at 100% or above.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.0 >= Self::FULL_BPS
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Percentage::zero()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Who performed a mutation. Supplied by the caller, used only to stamp
/// audit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: role.into(),
        }
    }
}

// =============================================================================
// Negotiation Status
// =============================================================================

/// Lifecycle state of a negotiation.
///
/// ```text
///   Drafting ──► FinancialClosing ──► Active ──► Completed
///      │                │              │  ▲
///      │                │              ▼  │
///      │                │           Suspended
///      │                │              │
///      │                └──────────────┴──► CancelledByRenunciation
///      └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Terms and payment sources are still being configured.
    Drafting,
    /// Sources reconcile with the total; financing may begin.
    FinancialClosing,
    /// Financing is underway.
    Active,
    /// Temporarily halted with a recorded motive.
    Suspended,
    /// Fully paid or administratively closed.
    Completed,
    /// The buyer renounced after financing closed.
    CancelledByRenunciation,
    /// Abandoned before financing closed.
    Cancelled,
}

impl NegotiationStatus {
    /// Terminal states are never left.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationStatus::Completed
                | NegotiationStatus::CancelledByRenunciation
                | NegotiationStatus::Cancelled
        )
    }

    /// Installments may only be recorded in these states.
    pub const fn is_payable(&self) -> bool {
        matches!(
            self,
            NegotiationStatus::FinancialClosing | NegotiationStatus::Active
        )
    }

    /// Payment sources may be added, edited or removed in these states.
    pub const fn sources_editable(&self) -> bool {
        matches!(
            self,
            NegotiationStatus::Drafting | NegotiationStatus::FinancialClosing
        )
    }

    /// Stable snake_case name, identical to the serialized form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Drafting => "drafting",
            NegotiationStatus::FinancialClosing => "financial_closing",
            NegotiationStatus::Active => "active",
            NegotiationStatus::Suspended => "suspended",
            NegotiationStatus::Completed => "completed",
            NegotiationStatus::CancelledByRenunciation => "cancelled_by_renunciation",
            NegotiationStatus::Cancelled => "cancelled",
        }
    }

    /// States that still count as an open deal for a client/unit pair.
    pub const OPEN: [NegotiationStatus; 4] = [
        NegotiationStatus::Drafting,
        NegotiationStatus::FinancialClosing,
        NegotiationStatus::Active,
        NegotiationStatus::Suspended,
    ];
}

impl Default for NegotiationStatus {
    fn default() -> Self {
        NegotiationStatus::Drafting
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Negotiation
// =============================================================================

/// A client's agreement to purchase a housing unit at an agreed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Negotiation {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub client_id: String,

    pub housing_unit_id: String,

    /// Price agreed before discount.
    pub negotiated_price_cents: i64,

    /// Discount applied (0 <= discount < price, or exactly 0).
    pub discount_cents: i64,

    /// negotiated price - discount.
    pub total_cents: i64,

    /// Sum of recorded installments (derived by the reconciler).
    pub total_paid_cents: i64,

    /// total - total paid, floored at zero (derived).
    pub balance_due_cents: i64,

    /// total paid / total in basis points (derived).
    pub percent_paid_bps: i64,

    /// Free text. Suspension and cancellation motives are appended here.
    pub notes: Option<String>,

    pub status: NegotiationStatus,

    pub cancellation_reason: Option<String>,

    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub financial_closing_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub activated_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
}

impl Negotiation {
    #[inline]
    pub fn negotiated_price(&self) -> Money {
        Money::from_cents(self.negotiated_price_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn total_paid(&self) -> Money {
        Money::from_cents(self.total_paid_cents)
    }

    #[inline]
    pub fn balance_due(&self) -> Money {
        Money::from_cents(self.balance_due_cents)
    }

    #[inline]
    pub fn percent_paid(&self) -> Percentage {
        Percentage::from_bps(self.percent_paid_bps.clamp(0, Percentage::FULL_BPS as i64) as u32)
    }
}

// =============================================================================
// Payment Source Kind
// =============================================================================

/// Funding channel of a payment source.
///
/// | Kind                    | Multiple disbursements | Entity   | Reference |
/// |-------------------------|------------------------|----------|-----------|
/// | InitialDownPayment      | yes                    | optional | optional  |
/// | MortgageLoan            | no                     | required | required  |
/// | NationalHousingSubsidy  | no                     | optional | required  |
/// | CompensationFundSubsidy | no                     | required | optional  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Paid by the buyer in as many installments as needed.
    InitialDownPayment,
    /// Bank mortgage, disbursed once.
    MortgageLoan,
    /// National housing subsidy ("Government Subsidy A").
    NationalHousingSubsidy,
    /// Family compensation fund subsidy ("Government Subsidy B").
    CompensationFundSubsidy,
}

impl SourceKind {
    pub const fn allows_multiple_disbursements(&self) -> bool {
        matches!(self, SourceKind::InitialDownPayment)
    }

    /// Whether the third-party entity name must be supplied.
    pub const fn requires_entity(&self) -> bool {
        matches!(
            self,
            SourceKind::MortgageLoan | SourceKind::CompensationFundSubsidy
        )
    }

    /// Whether the external reference number must be supplied.
    pub const fn requires_reference(&self) -> bool {
        matches!(
            self,
            SourceKind::MortgageLoan | SourceKind::NationalHousingSubsidy
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SourceKind::InitialDownPayment => "initial_down_payment",
            SourceKind::MortgageLoan => "mortgage_loan",
            SourceKind::NationalHousingSubsidy => "national_housing_subsidy",
            SourceKind::CompensationFundSubsidy => "compensation_fund_subsidy",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Source Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Nothing received yet.
    Pending,
    /// Partially received.
    InProgress,
    /// Received equals approved.
    Completed,
}

impl SourceStatus {
    /// The status a source must have for the given amounts.
    pub fn for_amounts(received: Money, approved: Money) -> Self {
        if received.is_positive() && received >= approved {
            SourceStatus::Completed
        } else if received.is_positive() {
            SourceStatus::InProgress
        } else {
            SourceStatus::Pending
        }
    }
}

impl Default for SourceStatus {
    fn default() -> Self {
        SourceStatus::Pending
    }
}

// =============================================================================
// Payment Source
// =============================================================================

/// One funding channel contributing to a negotiation's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentSource {
    pub id: String,

    /// Owning negotiation. Never changes.
    pub negotiation_id: String,

    pub kind: SourceKind,

    pub approved_amount_cents: i64,

    /// Starts at 0, moved only by recorded installments.
    pub received_amount_cents: i64,

    /// Bank, fund or agency granting the money.
    pub entity: Option<String>,

    /// Approval / resolution number issued by the entity.
    pub reference_number: Option<String>,

    /// Fixed from the kind at creation.
    pub allows_multiple_disbursements: bool,

    pub status: SourceStatus,

    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PaymentSource {
    #[inline]
    pub fn approved(&self) -> Money {
        Money::from_cents(self.approved_amount_cents)
    }

    #[inline]
    pub fn received(&self) -> Money {
        Money::from_cents(self.received_amount_cents)
    }

    /// approved - received.
    #[inline]
    pub fn outstanding(&self) -> Money {
        self.approved() - self.received()
    }

    /// received / approved.
    #[inline]
    pub fn completion(&self) -> Percentage {
        self.received().percentage_of(self.approved())
    }

    /// True once any money has been recorded against the source.
    #[inline]
    pub fn has_received(&self) -> bool {
        self.received_amount_cents != 0
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Check,
    Card,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Check => "check",
            PaymentMethod::Card => "card",
        }
    }
}

// =============================================================================
// Installment
// =============================================================================

/// Whether an installment is new money or a correction.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentKind {
    /// Money received from the source. Always positive.
    Disbursement,
    /// Signed correction of previously recorded money.
    Adjustment,
}

/// A single recorded movement of money against a payment source ("abono").
///
/// Installments are append-only: corrections are new `Adjustment` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Installment {
    pub id: String,

    pub negotiation_id: String,

    pub source_id: String,

    /// Human-readable code, e.g. `ABO-2026-10-001`.
    pub reference_code: String,

    pub kind: InstallmentKind,

    /// Positive for disbursements, signed for adjustments.
    pub amount_cents: i64,

    #[ts(as = "String")]
    pub disbursed_on: NaiveDate,

    /// None for adjustments.
    pub method: Option<PaymentMethod>,

    /// Free text. Holds the reason for adjustments.
    pub notes: Option<String>,

    /// Payer's bank or transfer reference.
    pub external_reference: Option<String>,

    /// Actor id that recorded the entry.
    pub recorded_by: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Installment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Read Models
// =============================================================================

/// Approved / received sums over a negotiation's sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SourceTotals {
    pub source_count: u32,
    pub approved: Money,
    pub received: Money,
    pub outstanding: Money,
}

/// Filter for listing installments. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InstallmentFilter {
    pub negotiation_id: Option<String>,
    pub source_id: Option<String>,
    pub method: Option<PaymentMethod>,
    #[ts(as = "Option<String>")]
    pub from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub to: Option<NaiveDate>,
}

/// Summary figures over a negotiation's installments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InstallmentStatistics {
    pub count: u32,
    pub total: Money,
    /// Integer average (truncated toward zero), zero when empty.
    pub average: Money,
    pub by_method: Vec<MethodCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodCount {
    /// None groups adjustments.
    pub method: Option<PaymentMethod>,
    pub count: u32,
    pub total: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_display() {
        assert_eq!(Percentage::from_bps(6_000).to_string(), "60.00%");
        assert_eq!(Percentage::from_bps(3_333).to_string(), "33.33%");
        assert!((Percentage::from_bps(825).percentage() - 8.25).abs() < 0.001);
        assert!(Percentage::full().is_full());
        assert!(!Percentage::from_bps(9_999).is_full());
    }

    #[test]
    fn test_status_classification() {
        assert!(NegotiationStatus::Completed.is_terminal());
        assert!(NegotiationStatus::Cancelled.is_terminal());
        assert!(!NegotiationStatus::Suspended.is_terminal());

        assert!(NegotiationStatus::Active.is_payable());
        assert!(NegotiationStatus::FinancialClosing.is_payable());
        assert!(!NegotiationStatus::Suspended.is_payable());
        assert!(!NegotiationStatus::Drafting.is_payable());

        assert!(NegotiationStatus::Drafting.sources_editable());
        assert!(!NegotiationStatus::Active.sources_editable());

        assert_eq!(NegotiationStatus::default(), NegotiationStatus::Drafting);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&NegotiationStatus::CancelledByRenunciation).unwrap();
        assert_eq!(json, "\"cancelled_by_renunciation\"");
        assert_eq!(
            NegotiationStatus::FinancialClosing.to_string(),
            "financial_closing"
        );
    }

    #[test]
    fn test_source_kind_rules() {
        assert!(SourceKind::InitialDownPayment.allows_multiple_disbursements());
        assert!(!SourceKind::MortgageLoan.allows_multiple_disbursements());
        assert!(!SourceKind::NationalHousingSubsidy.allows_multiple_disbursements());

        assert!(SourceKind::MortgageLoan.requires_entity());
        assert!(SourceKind::MortgageLoan.requires_reference());
        assert!(!SourceKind::NationalHousingSubsidy.requires_entity());
        assert!(SourceKind::NationalHousingSubsidy.requires_reference());
        assert!(SourceKind::CompensationFundSubsidy.requires_entity());
        assert!(!SourceKind::CompensationFundSubsidy.requires_reference());
        assert!(!SourceKind::InitialDownPayment.requires_entity());
    }

    #[test]
    fn test_source_status_for_amounts() {
        let approved = Money::from_units(100);
        assert_eq!(
            SourceStatus::for_amounts(Money::zero(), approved),
            SourceStatus::Pending
        );
        assert_eq!(
            SourceStatus::for_amounts(Money::from_units(40), approved),
            SourceStatus::InProgress
        );
        assert_eq!(
            SourceStatus::for_amounts(approved, approved),
            SourceStatus::Completed
        );
    }
}
