//! # Aggregate Math
//!
//! Pure functions behind the Aggregate Reconciler and the payment-source
//! balance rules.
//!
//! ## Derived Fields
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  installments ──Σ amount──► total_paid                                  │
//! │                                  │                                      │
//! │  negotiation.total ──────────────┼──► balance_due = max(total-paid, 0)  │
//! │                                  └──► percent_paid = paid/total (bps)   │
//! │                                                                         │
//! │  sources ──Σ approved──► CanCloseFinancially: |Σ - total| <= epsilon   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is deterministic: same input, same output. Calling
//! [`compute_aggregates`] twice over unchanged installments yields identical
//! values, which is what makes reconciliation idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ConflictError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Negotiation, PaymentSource, Percentage, SourceStatus, SourceTotals};

// =============================================================================
// Negotiation Aggregates
// =============================================================================

/// The derived money fields of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NegotiationAggregates {
    pub total_paid: Money,
    pub balance_due: Money,
    pub percent_paid: Percentage,
}

impl NegotiationAggregates {
    /// Writes the aggregates onto a negotiation.
    ///
    /// ## Returns
    /// `true` when any derived field changed.
    pub fn apply_to(&self, negotiation: &mut Negotiation) -> bool {
        let changed = negotiation.total_paid_cents != self.total_paid.cents()
            || negotiation.balance_due_cents != self.balance_due.cents()
            || negotiation.percent_paid_bps != self.percent_paid.bps() as i64;

        negotiation.total_paid_cents = self.total_paid.cents();
        negotiation.balance_due_cents = self.balance_due.cents();
        negotiation.percent_paid_bps = self.percent_paid.bps() as i64;
        changed
    }
}

/// Recomputes total paid, balance due and percent paid.
///
/// ## Example
/// ```rust
/// use ledger_core::money::Money;
/// use ledger_core::reconcile::compute_aggregates;
///
/// let total = Money::from_units(100_000_000);
/// let agg = compute_aggregates(total, [Money::from_units(60_000_000)]);
/// assert_eq!(agg.balance_due, Money::from_units(40_000_000));
/// assert_eq!(agg.percent_paid.bps(), 6_000);
/// ```
pub fn compute_aggregates<I>(total: Money, installment_amounts: I) -> NegotiationAggregates
where
    I: IntoIterator<Item = Money>,
{
    let total_paid: Money = installment_amounts.into_iter().sum();
    NegotiationAggregates {
        total_paid,
        balance_due: (total - total_paid).floor_zero(),
        percent_paid: total_paid.percentage_of(total),
    }
}

// =============================================================================
// Source Totals
// =============================================================================

/// Sums approved and received amounts across sources.
pub fn source_totals(sources: &[PaymentSource]) -> SourceTotals {
    let approved: Money = sources.iter().map(PaymentSource::approved).sum();
    let received: Money = sources.iter().map(PaymentSource::received).sum();
    SourceTotals {
        source_count: sources.len() as u32,
        approved,
        received,
        outstanding: approved - received,
    }
}

/// True iff the approved amounts add up to the negotiation total, within
/// `epsilon` in either direction.
pub fn can_close_financially(total: Money, approved_sum: Money, epsilon: Money) -> bool {
    approved_sum.within(total, epsilon)
}

// =============================================================================
// Source Balance Rules
// =============================================================================

/// Applies a received-amount change to a source.
///
/// `delta` is positive for disbursements and signed for adjustments.
///
/// ## Rules
/// - the new received amount may not exceed approved (`AmountExceedsBalance`)
/// - the new received amount may not drop below zero (`WouldBecomeNegative`)
/// - status and `completed_at` follow the new amount
///
/// The caller's source is left untouched on error.
pub fn apply_receipt(
    source: &PaymentSource,
    delta: Money,
    now: DateTime<Utc>,
) -> CoreResult<PaymentSource> {
    let exceeds = || ConflictError::AmountExceedsBalance {
        target: format!("payment source {}", source.id),
        requested: delta,
        available: source.outstanding(),
    };

    let received = source.received().checked_add(delta).ok_or_else(exceeds)?;
    if received > source.approved() {
        return Err(exceeds().into());
    }
    if received.is_negative() {
        return Err(ValidationError::WouldBecomeNegative {
            field: "received_amount".to_string(),
            result: received,
        }
        .into());
    }

    let mut updated = source.clone();
    updated.received_amount_cents = received.cents();
    updated.status = SourceStatus::for_amounts(received, source.approved());
    updated.completed_at = match updated.status {
        SourceStatus::Completed => source.completed_at.or(Some(now)),
        _ => None,
    };
    updated.updated_at = now;
    Ok(updated)
}

/// Rejects an installment that would push total paid above the total.
///
/// Sources may be edited during financial closing, so their approved sum
/// can briefly exceed the total. This check keeps total paid bounded anyway.
pub fn check_negotiation_capacity(negotiation: &Negotiation, delta: Money) -> CoreResult<()> {
    if !delta.is_positive() {
        return Ok(());
    }
    let fits = negotiation
        .total_paid()
        .checked_add(delta)
        .is_some_and(|paid| paid <= negotiation.total());
    if !fits {
        return Err(ConflictError::AmountExceedsBalance {
            target: format!("negotiation {}", negotiation.id),
            requested: delta,
            available: (negotiation.total() - negotiation.total_paid()).floor_zero(),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
