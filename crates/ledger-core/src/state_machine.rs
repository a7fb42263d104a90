//! # Negotiation Lifecycle Rules
//!
//! The transition table, its guards and the field changes each transition
//! makes. The engine loads the latest persisted state, gathers the facts
//! guards need and calls [`plan_transition`]; persisting the result is its
//! job, deciding is ours.
//!
//! ## Transition Table
//! ```text
//! ┌──────────────────┬─────────────────────────┬──────────────────────────────┐
//! │ From             │ To                      │ Guard                        │
//! ├──────────────────┼─────────────────────────┼──────────────────────────────┤
//! │ Drafting         │ FinancialClosing        │ ≥1 source, sources reconcile │
//! │ Drafting         │ Cancelled               │ motive                       │
//! │ FinancialClosing │ Active                  │ sources reconcile, ≥1 inst.  │
//! │ Active           │ Suspended               │ motive                       │
//! │ Suspended        │ Active                  │ none                         │
//! │ Active           │ Completed               │ 100% paid or administrative  │
//! │ FinancialClosing │ CancelledByRenunciation │ motive                       │
//! │ Active           │ CancelledByRenunciation │ motive                       │
//! │ Suspended        │ CancelledByRenunciation │ motive                       │
//! └──────────────────┴─────────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Check Order
//! 1. Table membership → `InvalidTransition`
//! 2. Input validation (motive) → `Validation`
//! 3. Guard → `TransitionNotAllowed`

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ConflictError, CoreResult};
use crate::types::{Negotiation, NegotiationStatus, Percentage};
use crate::validation::validate_motive;

use crate::types::NegotiationStatus::*;

// =============================================================================
// Transition Requests
// =============================================================================

/// A caller's request to move a negotiation to another state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionRequest {
    /// Drafting → FinancialClosing.
    CloseFinancially,
    /// FinancialClosing → Active.
    Activate,
    /// Active → Suspended.
    Suspend { motive: String },
    /// Suspended → Active.
    Resume,
    /// Active → Completed. `administrative` bypasses the 100% guard.
    Complete { administrative: bool },
    /// FinancialClosing / Active / Suspended → CancelledByRenunciation.
    Renounce { motive: String },
    /// Drafting → Cancelled.
    Cancel { motive: String },
}

impl TransitionRequest {
    /// The state this request leads to.
    pub const fn target(&self) -> NegotiationStatus {
        match self {
            TransitionRequest::CloseFinancially => FinancialClosing,
            TransitionRequest::Activate | TransitionRequest::Resume => Active,
            TransitionRequest::Suspend { .. } => Suspended,
            TransitionRequest::Complete { .. } => Completed,
            TransitionRequest::Renounce { .. } => CancelledByRenunciation,
            TransitionRequest::Cancel { .. } => Cancelled,
        }
    }

    /// States this request may be issued from.
    pub const fn allowed_from(&self) -> &'static [NegotiationStatus] {
        match self {
            TransitionRequest::CloseFinancially => &[Drafting],
            TransitionRequest::Activate => &[FinancialClosing],
            TransitionRequest::Suspend { .. } => &[Active],
            TransitionRequest::Resume => &[Suspended],
            TransitionRequest::Complete { .. } => &[Active],
            TransitionRequest::Renounce { .. } => &[FinancialClosing, Active, Suspended],
            TransitionRequest::Cancel { .. } => &[Drafting],
        }
    }

    fn motive(&self) -> Option<&str> {
        match self {
            TransitionRequest::Suspend { motive }
            | TransitionRequest::Renounce { motive }
            | TransitionRequest::Cancel { motive } => Some(motive),
            _ => None,
        }
    }

    /// Label written in front of the motive in the notes.
    fn note_label(&self) -> &'static str {
        match self {
            TransitionRequest::Suspend { .. } => "Suspended",
            TransitionRequest::Renounce { .. } => "Renounced",
            TransitionRequest::Cancel { .. } => "Cancelled",
            _ => "",
        }
    }
}

/// True when `(from, to)` appears in the transition table.
pub fn is_valid_transition(from: NegotiationStatus, to: NegotiationStatus) -> bool {
    matches!(
        (from, to),
        (Drafting, FinancialClosing)
            | (Drafting, Cancelled)
            | (FinancialClosing, Active)
            | (Active, Suspended)
            | (Suspended, Active)
            | (Active, Completed)
            | (FinancialClosing, CancelledByRenunciation)
            | (Active, CancelledByRenunciation)
            | (Suspended, CancelledByRenunciation)
    )
}

// =============================================================================
// Guard Facts
// =============================================================================

/// Facts about the persisted ledger a guard may consult.
///
/// Gathered fresh from storage right before planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionFacts {
    pub source_count: u32,
    /// Result of `can_close_financially` over the current sources.
    pub sources_reconcile: bool,
    pub installment_count: u32,
    pub percent_paid: Percentage,
}

// =============================================================================
// Planning
// =============================================================================

/// Decides a transition and returns the negotiation as it must be persisted.
///
/// `current` must be the latest persisted state. The returned value has the
/// new status, stamped timestamps and appended notes; `version` is left for
/// the storage layer to bump.
///
/// ## Example
/// ```rust,ignore
/// let facts = TransitionFacts { source_count: 2, sources_reconcile: true, ..Default::default() };
/// let next = plan_transition(&negotiation, &TransitionRequest::CloseFinancially, &facts, now)?;
/// assert_eq!(next.status, NegotiationStatus::FinancialClosing);
/// ```
pub fn plan_transition(
    current: &Negotiation,
    request: &TransitionRequest,
    facts: &TransitionFacts,
    now: DateTime<Utc>,
) -> CoreResult<Negotiation> {
    let from = current.status;
    let to = request.target();

    // 1. Table
    if !request.allowed_from().contains(&from) || !is_valid_transition(from, to) {
        return Err(ConflictError::InvalidTransition { from, to }.into());
    }

    // 2. Input
    let motive = request.motive().map(validate_motive).transpose()?;

    // 3. Guard
    let refuse = |reason: &str| -> CoreResult<Negotiation> {
        Err(ConflictError::TransitionNotAllowed {
            from,
            to,
            reason: reason.to_string(),
        }
        .into())
    };
    match request {
        TransitionRequest::CloseFinancially => {
            if facts.source_count == 0 {
                return refuse("the negotiation has no payment sources");
            }
            if !facts.sources_reconcile {
                return refuse("approved amounts do not add up to the negotiation total");
            }
        }
        TransitionRequest::Activate => {
            if !facts.sources_reconcile {
                return refuse("approved amounts do not add up to the negotiation total");
            }
            if facts.installment_count == 0 {
                return refuse("no installment has been recorded yet");
            }
        }
        TransitionRequest::Complete { administrative } => {
            if !administrative && !facts.percent_paid.is_full() {
                return refuse("the negotiation is not fully paid");
            }
        }
        _ => {}
    }

    // Side effects on the record
    let mut next = current.clone();
    next.status = to;
    next.updated_at = now;

    match request {
        TransitionRequest::CloseFinancially => next.financial_closing_at = Some(now),
        TransitionRequest::Activate => next.activated_at = Some(now),
        TransitionRequest::Complete { .. } => next.completed_at = Some(now),
        TransitionRequest::Renounce { .. } | TransitionRequest::Cancel { .. } => {
            next.cancelled_at = Some(now);
            next.cancellation_reason = motive.clone();
        }
        TransitionRequest::Suspend { .. } | TransitionRequest::Resume => {}
    }

    if let Some(motive) = motive {
        next.notes = Some(append_note(
            current.notes.as_deref(),
            now,
            request.note_label(),
            &motive,
        ));
    }

    Ok(next)
}

/// Appends a `[<RFC 3339>] <label>: <text>` line to existing notes.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use ledger_core::state_machine::append_note;
///
/// let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
/// let notes = append_note(Some("Unit 4B"), at, "Suspended", "bank audit");
/// assert_eq!(notes, "Unit 4B\n[2026-10-16T09:30:00Z] Suspended: bank audit");
/// ```
pub fn append_note(existing: Option<&str>, at: DateTime<Utc>, label: &str, text: &str) -> String {
    let line = format!(
        "[{}] {}: {}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        label,
        text
    );
    match existing.map(str::trim_end) {
        Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, line),
        _ => line,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ValidationError};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn negotiation(status: NegotiationStatus) -> Negotiation {
        Negotiation {
            id: "neg-1".to_string(),
            client_id: "c".to_string(),
            housing_unit_id: "u".to_string(),
            negotiated_price_cents: 10_000,
            discount_cents: 0,
            total_cents: 10_000,
            total_paid_cents: 0,
            balance_due_cents: 10_000,
            percent_paid_bps: 0,
            notes: None,
            status,
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

    fn ready() -> TransitionFacts {
        TransitionFacts {
            source_count: 2,
            sources_reconcile: true,
            installment_count: 1,
            percent_paid: Percentage::full(),
        }
    }

    fn conflict(result: CoreResult<Negotiation>) -> ConflictError {
        match result {
            Err(CoreError::Conflict(c)) => c,
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_close_financially_stamps_timestamp() {
        let next = plan_transition(
            &negotiation(Drafting),
            &TransitionRequest::CloseFinancially,
            &ready(),
            now(),
        )
        .unwrap();
        assert_eq!(next.status, FinancialClosing);
        assert_eq!(next.financial_closing_at, Some(now()));
        assert_eq!(next.version, 1);
    }

    #[test]
    fn test_close_financially_guards() {
        let no_sources = TransitionFacts {
            source_count: 0,
            ..ready()
        };
        assert!(matches!(
            conflict(plan_transition(
                &negotiation(Drafting),
                &TransitionRequest::CloseFinancially,
                &no_sources,
                now()
            )),
            ConflictError::TransitionNotAllowed { .. }
        ));

        let unbalanced = TransitionFacts {
            sources_reconcile: false,
            ..ready()
        };
        assert!(matches!(
            conflict(plan_transition(
                &negotiation(Drafting),
                &TransitionRequest::CloseFinancially,
                &unbalanced,
                now()
            )),
            ConflictError::TransitionNotAllowed { .. }
        ));
    }

    #[test]
    fn test_activate_requires_an_installment() {
        let facts = TransitionFacts {
            installment_count: 0,
            ..ready()
        };
        assert!(matches!(
            conflict(plan_transition(
                &negotiation(FinancialClosing),
                &TransitionRequest::Activate,
                &facts,
                now()
            )),
            ConflictError::TransitionNotAllowed { .. }
        ));

        let next = plan_transition(
            &negotiation(FinancialClosing),
            &TransitionRequest::Activate,
            &ready(),
            now(),
        )
        .unwrap();
        assert_eq!(next.status, Active);
        assert_eq!(next.activated_at, Some(now()));
    }

    #[test]
    fn test_invalid_transitions() {
        let cases = [
            (Completed, TransitionRequest::Resume),
            (Completed, TransitionRequest::Activate),
            (Drafting, TransitionRequest::Activate),
            (Active, TransitionRequest::CloseFinancially),
            (Suspended, TransitionRequest::Activate),
            (FinancialClosing, TransitionRequest::Resume),
            (Drafting, TransitionRequest::Renounce { motive: "x".into() }),
            (Active, TransitionRequest::Cancel { motive: "x".into() }),
            (Cancelled, TransitionRequest::Cancel { motive: "x".into() }),
            (Suspended, TransitionRequest::Complete { administrative: true }),
        ];
        for (from, request) in cases {
            let err = conflict(plan_transition(&negotiation(from), &request, &ready(), now()));
            assert_eq!(
                err,
                ConflictError::InvalidTransition {
                    from,
                    to: request.target()
                }
            );
        }
    }

    #[test]
    fn test_table_checked_before_motive() {
        // Empty motive on a transition outside the table reports the table
        let err = conflict(plan_transition(
            &negotiation(Completed),
            &TransitionRequest::Suspend { motive: String::new() },
            &ready(),
            now(),
        ));
        assert!(matches!(err, ConflictError::InvalidTransition { .. }));
    }

    #[test]
    fn test_suspend_requires_motive_and_appends_note() {
        let result = plan_transition(
            &negotiation(Active),
            &TransitionRequest::Suspend { motive: "  ".into() },
            &ready(),
            now(),
        );
        assert_eq!(
            result.unwrap_err(),
            CoreError::Validation(ValidationError::required("motive"))
        );

        let mut active = negotiation(Active);
        active.notes = Some("Corner unit".to_string());
        let next = plan_transition(
            &active,
            &TransitionRequest::Suspend {
                motive: "pending bank audit".into(),
            },
            &ready(),
            now(),
        )
        .unwrap();
        assert_eq!(next.status, Suspended);
        assert_eq!(
            next.notes.as_deref(),
            Some("Corner unit\n[2026-10-16T12:00:00Z] Suspended: pending bank audit")
        );
        assert_eq!(next.cancellation_reason, None);
    }

    #[test]
    fn test_resume_keeps_original_activation() {
        let mut suspended = negotiation(Suspended);
        let first = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        suspended.activated_at = Some(first);
        let next =
            plan_transition(&suspended, &TransitionRequest::Resume, &TransitionFacts::default(), now())
                .unwrap();
        assert_eq!(next.status, Active);
        assert_eq!(next.activated_at, Some(first));
    }

    #[test]
    fn test_complete_requires_full_payment_unless_administrative() {
        let partial = TransitionFacts {
            percent_paid: Percentage::from_bps(9_999),
            ..ready()
        };
        assert!(matches!(
            conflict(plan_transition(
                &negotiation(Active),
                &TransitionRequest::Complete { administrative: false },
                &partial,
                now()
            )),
            ConflictError::TransitionNotAllowed { .. }
        ));

        let next = plan_transition(
            &negotiation(Active),
            &TransitionRequest::Complete { administrative: true },
            &partial,
            now(),
        )
        .unwrap();
        assert_eq!(next.status, Completed);
        assert_eq!(next.completed_at, Some(now()));
    }

    #[test]
    fn test_renounce_sets_cancellation_fields() {
        for from in [FinancialClosing, Active, Suspended] {
            let next = plan_transition(
                &negotiation(from),
                &TransitionRequest::Renounce {
                    motive: "buyer withdrew".into(),
                },
                &ready(),
                now(),
            )
            .unwrap();
            assert_eq!(next.status, CancelledByRenunciation);
            assert_eq!(next.cancellation_reason.as_deref(), Some("buyer withdrew"));
            assert_eq!(next.cancelled_at, Some(now()));
            assert!(next.notes.unwrap().contains("Renounced: buyer withdrew"));
        }
    }

    #[test]
    fn test_cancel_from_drafting() {
        let next = plan_transition(
            &negotiation(Drafting),
            &TransitionRequest::Cancel {
                motive: "unit reassigned".into(),
            },
            &TransitionFacts::default(),
            now(),
        )
        .unwrap();
        assert_eq!(next.status, Cancelled);
        assert!(next.status.is_terminal());
    }

    #[test]
    fn test_table_matches_requests() {
        let requests = [
            TransitionRequest::CloseFinancially,
            TransitionRequest::Activate,
            TransitionRequest::Suspend { motive: "m".into() },
            TransitionRequest::Resume,
            TransitionRequest::Complete { administrative: true },
            TransitionRequest::Renounce { motive: "m".into() },
            TransitionRequest::Cancel { motive: "m".into() },
        ];
        for request in &requests {
            for from in request.allowed_from() {
                assert!(is_valid_transition(*from, request.target()));
            }
        }
        for terminal in [Completed, CancelledByRenunciation, Cancelled] {
            for request in &requests {
                assert!(!request.allowed_from().contains(&terminal));
            }
        }
    }

    #[test]
    fn test_append_note_to_empty() {
        assert_eq!(
            append_note(None, now(), "Cancelled", "duplicate"),
            "[2026-10-16T12:00:00Z] Cancelled: duplicate"
        );
        assert_eq!(
            append_note(Some(""), now(), "Cancelled", "duplicate"),
            "[2026-10-16T12:00:00Z] Cancelled: duplicate"
        );
    }
}
