//! # Installment Recorder
//!
//! Records money received against a payment source ("abonos") and signed
//! corrections of it.
//!
//! ## Recording Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock(negotiation) ──► BEGIN                                            │
//! │     │                                                                   │
//! │     ├── negotiation payable?            no ──► NegotiationNotPayable    │
//! │     ├── source belongs to negotiation?  no ──► SourceNegotiationMismatch│
//! │     ├── single-disbursement source                                      │
//! │     │   already disbursed?             yes ──► SourceAlreadySettled     │
//! │     ├── received + amount <= approved?  no ──► AmountExceedsBalance     │
//! │     │                                                                   │
//! │     ├── counter(negotiation, year, month) += 1 ──► ABO-2026-10-007      │
//! │     ├── INSERT installment                                              │
//! │     ├── UPDATE source (received, status, completed_at)                  │
//! │     ├── reconcile negotiation aggregates                                │
//! │     ├── Active and 100% paid? ──► Completed (when enabled)              │
//! │     └── UPDATE negotiation (version checked)                            │
//! │  COMMIT ──► audit: installment Create, source Update,                   │
//! │             negotiation Update(s)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requested amounts are never clamped: an amount that does not fit is
//! rejected whole.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use ledger_core::audit::{AuditEntry, EntityType};
use ledger_core::reconcile::{apply_receipt, check_negotiation_capacity};
use ledger_core::reference::ReferenceCode;
use ledger_core::state_machine::{plan_transition, TransitionFacts, TransitionRequest};
use ledger_core::validation::{
    validate_actor, validate_adjustment_amount, validate_external_reference, validate_id,
    validate_notes, validate_positive_amount, validate_reason,
};
use ledger_core::{
    Actor, ConflictError, Installment, InstallmentFilter, InstallmentKind, InstallmentStatistics,
    Money, Negotiation, NegotiationStatus, PaymentMethod, PaymentSource,
};
use ledger_db::DbError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::Committed;
use crate::context::LedgerContext;
use crate::error::{LedgerError, LedgerResult};
use crate::outcome::Outcome;
use crate::reconciler::reconcile_in_tx;

/// Input of [`InstallmentRecorder::record_installment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstallment {
    pub negotiation_id: String,
    pub source_id: String,
    pub amount: Money,
    pub disbursed_on: NaiveDate,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub external_reference: Option<String>,
}

/// Input of [`InstallmentRecorder::record_adjustment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub negotiation_id: String,
    pub source_id: String,
    /// Signed, non-zero.
    pub amount: Money,
    pub adjusted_on: NaiveDate,
    pub reason: String,
}

/// The stored installment together with the rows it moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedInstallment {
    pub installment: Installment,
    pub source: PaymentSource,
    pub negotiation: Negotiation,
}

/// Validated entry shared by disbursements and adjustments.
#[derive(Debug)]
struct Entry {
    negotiation_id: String,
    source_id: String,
    kind: InstallmentKind,
    amount: Money,
    date: NaiveDate,
    method: Option<PaymentMethod>,
    notes: Option<String>,
    external_reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InstallmentRecorder {
    ctx: LedgerContext,
}

impl InstallmentRecorder {
    pub fn new(ctx: LedgerContext) -> Self {
        InstallmentRecorder { ctx }
    }

    /// Records a disbursement against a payment source.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive amount or over-long text
    /// - `NotFound` for an unknown negotiation or source
    /// - `Conflict` with `NegotiationNotPayable`, `SourceNegotiationMismatch`,
    ///   `SourceAlreadySettled`, `AmountExceedsBalance` or
    ///   `ReferenceSpaceExhausted`
    /// - `ConcurrencyConflict` when contention outlasts the retry budget
    pub async fn record_installment(
        &self,
        actor: &Actor,
        input: NewInstallment,
    ) -> LedgerResult<Outcome<RecordedInstallment>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("negotiation_id", &input.negotiation_id)?;
        validate_id("source_id", &input.source_id)?;
        validate_positive_amount("amount", input.amount)?;

        let entry = Entry {
            negotiation_id: input.negotiation_id,
            source_id: input.source_id,
            kind: InstallmentKind::Disbursement,
            amount: input.amount,
            date: input.disbursed_on,
            method: Some(input.method),
            notes: validate_notes(input.notes.as_deref())?,
            external_reference: validate_external_reference(input.external_reference.as_deref())?,
        };
        self.record(actor, "record_installment", entry).await
    }

    /// Records a signed correction of money previously recorded.
    ///
    /// Adjustments take a reference code from the same sequence and are not
    /// subject to the single-disbursement rule.
    pub async fn record_adjustment(
        &self,
        actor: &Actor,
        input: NewAdjustment,
    ) -> LedgerResult<Outcome<RecordedInstallment>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("negotiation_id", &input.negotiation_id)?;
        validate_id("source_id", &input.source_id)?;
        validate_adjustment_amount(input.amount)?;
        let reason = validate_reason(&input.reason)?;

        let entry = Entry {
            negotiation_id: input.negotiation_id,
            source_id: input.source_id,
            kind: InstallmentKind::Adjustment,
            amount: input.amount,
            date: input.adjusted_on,
            method: None,
            notes: Some(reason),
            external_reference: None,
        };
        self.record(actor, "record_adjustment", entry).await
    }

    async fn record(
        &self,
        actor: &Actor,
        operation: &str,
        entry: Entry,
    ) -> LedgerResult<Outcome<RecordedInstallment>> {
        let entry = &entry;
        let committed = self
            .ctx
            .retry
            .run(operation, move || self.try_record(actor, entry))
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_record(&self, actor: &Actor, entry: &Entry) -> LedgerResult<Committed<RecordedInstallment>> {
        let db = &self.ctx.db;
        let settings = &self.ctx.settings;
        let guard = self.ctx.locks.acquire(&entry.negotiation_id).await?;
        let mut tx = db.begin().await?;

        let negotiation = db.negotiations().require(&mut *tx, &entry.negotiation_id).await?;
        if !negotiation.status.is_payable() {
            return Err(ConflictError::NegotiationNotPayable {
                negotiation_id: negotiation.id,
                status: negotiation.status,
            }
            .into());
        }

        let source = db.payment_sources().require(&mut *tx, &entry.source_id).await?;
        if source.negotiation_id != negotiation.id {
            return Err(ConflictError::SourceNegotiationMismatch {
                source_id: source.id,
                negotiation_id: negotiation.id,
            }
            .into());
        }

        if entry.kind == InstallmentKind::Disbursement
            && !source.allows_multiple_disbursements
            && (source.has_received()
                || db.installments().count_disbursements(&mut *tx, &source.id).await? > 0)
        {
            return Err(ConflictError::SourceAlreadySettled { source_id: source.id }.into());
        }

        let now = Utc::now();
        let updated_source = apply_receipt(&source, entry.amount, now)?;
        check_negotiation_capacity(&negotiation, entry.amount)?;

        let reference_code = self.next_reference_code(&mut tx, &negotiation.id, now).await?;
        let installment = Installment {
            id: Uuid::new_v4().to_string(),
            negotiation_id: negotiation.id.clone(),
            source_id: source.id.clone(),
            reference_code,
            kind: entry.kind,
            amount_cents: entry.amount.cents(),
            disbursed_on: entry.date,
            method: entry.method,
            notes: entry.notes.clone(),
            external_reference: entry.external_reference.clone(),
            recorded_by: actor.id.clone(),
            created_at: now,
        };

        db.installments().insert(&mut *tx, &installment).await?;
        db.payment_sources().update(&mut *tx, &updated_source).await?;

        let mut reconciled = negotiation.clone();
        let changed = reconcile_in_tx(db, &mut tx, &mut reconciled).await?;
        reconciled.updated_at = now;

        let completed = if settings.auto_complete
            && reconciled.status == NegotiationStatus::Active
            && reconciled.percent_paid().is_full()
        {
            let facts = TransitionFacts {
                percent_paid: reconciled.percent_paid(),
                ..Default::default()
            };
            Some(plan_transition(
                &reconciled,
                &TransitionRequest::Complete { administrative: false },
                &facts,
                now,
            )?)
        } else {
            None
        };

        let mut stored = completed.clone().unwrap_or_else(|| reconciled.clone());
        stored.version = db.negotiations().update(&mut *tx, &stored).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            installment_id = %installment.id,
            reference_code = %installment.reference_code,
            kind = ?installment.kind,
            amount = %installment.amount(),
            source_status = ?updated_source.status,
            percent_paid = %stored.percent_paid(),
            "Installment recorded"
        );

        let mut committed = Committed::new(
            RecordedInstallment {
                installment: installment.clone(),
                source: updated_source.clone(),
                negotiation: stored.clone(),
            },
            guard,
        )
        .audit(AuditEntry::create(EntityType::Installment, &installment.id, &installment))
        .audit(
            AuditEntry::update(EntityType::PaymentSource, &source.id, &source, &updated_source)
                .with_metadata(json!({ "installment_id": installment.id })),
        );

        match completed {
            Some(_) => {
                info!(negotiation_id = %stored.id, "Negotiation fully paid; completed");
                if changed {
                    committed = committed.audit(
                        AuditEntry::update(EntityType::Negotiation, &negotiation.id, &negotiation, &reconciled)
                            .with_metadata(json!({ "reason": "reconcile", "installment_id": installment.id })),
                    );
                }
                committed = committed.audit(
                    AuditEntry::update(EntityType::Negotiation, &stored.id, &reconciled, &stored).with_metadata(
                        json!({
                            "transition": "complete",
                            "from": NegotiationStatus::Active,
                            "to": NegotiationStatus::Completed,
                            "automatic": true,
                        }),
                    ),
                );
            }
            None if changed => {
                committed = committed.audit(
                    AuditEntry::update(EntityType::Negotiation, &negotiation.id, &negotiation, &stored)
                        .with_metadata(json!({ "reason": "reconcile", "installment_id": installment.id })),
                );
            }
            None => {}
        }

        Ok(committed)
    }

    /// Allocates the next code of the negotiation's counter for the UTC
    /// month of `now`.
    async fn next_reference_code(
        &self,
        conn: &mut sqlx::SqliteConnection,
        negotiation_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<String> {
        let (year, month) = (now.year(), now.month());
        let sequence = self
            .ctx
            .db
            .reference_counters()
            .next(&mut *conn, negotiation_id, year, month)
            .await?;
        let code = ReferenceCode::new(
            negotiation_id,
            &self.ctx.settings.reference_prefix,
            year,
            month,
            sequence,
        )?;
        debug!(negotiation_id = %negotiation_id, code = %code, "Reference code allocated");
        Ok(code.to_string())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_installment(&self, installment_id: &str) -> LedgerResult<Installment> {
        let db = &self.ctx.db;
        db.installments()
            .get(db.pool(), installment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Installment", installment_id))
    }

    /// Installments matching `filter`, newest disbursement date first.
    pub async fn list_installments(&self, filter: &InstallmentFilter) -> LedgerResult<Vec<Installment>> {
        let db = &self.ctx.db;
        Ok(db.installments().list(db.pool(), filter).await?)
    }

    /// Count, total, average and per-method breakdown of a negotiation.
    pub async fn statistics(&self, negotiation_id: &str) -> LedgerResult<InstallmentStatistics> {
        let db = &self.ctx.db;
        db.negotiations().require(db.pool(), negotiation_id).await?;
        Ok(db.installments().statistics(db.pool(), negotiation_id).await?)
    }
}
