//! # Aggregate Reconciler
//!
//! Recomputes a negotiation's derived money fields from its installments.
//!
//! ```text
//! installments(negotiation) ──► Σ amount ──► total_paid
//!                                            balance_due  = max(total - total_paid, 0)
//!                                            percent_paid = total_paid / total (bps)
//! ```
//!
//! Writers call [`reconcile_in_tx`] inside their own transaction, so the
//! aggregates always commit together with the installment that moved them.
//! [`Reconciler::reconcile`] is the standalone form: it writes only when a
//! derived field actually differs, so running it twice is a no-op.

use chrono::Utc;
use ledger_core::audit::{AuditEntry, EntityType};
use ledger_core::reconcile::{can_close_financially, compute_aggregates, NegotiationAggregates};
use ledger_core::validation::validate_actor;
use ledger_core::{Actor, Negotiation};
use ledger_db::{Database, DbError};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;

use crate::audit::Committed;
use crate::context::LedgerContext;
use crate::error::LedgerResult;
use crate::outcome::Outcome;

/// Recomputes `negotiation`'s aggregates from the installments visible on
/// `conn` and writes them onto the value.
///
/// ## Returns
/// `true` when any derived field changed. Nothing is persisted here.
pub(crate) async fn reconcile_in_tx(
    db: &Database,
    conn: &mut SqliteConnection,
    negotiation: &mut Negotiation,
) -> LedgerResult<bool> {
    let amounts = db
        .installments()
        .amounts_for_negotiation(&mut *conn, &negotiation.id)
        .await?;
    Ok(compute_aggregates(negotiation.total(), amounts).apply_to(negotiation))
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    ctx: LedgerContext,
}

impl Reconciler {
    pub fn new(ctx: LedgerContext) -> Self {
        Reconciler { ctx }
    }

    /// Brings the stored aggregates in line with the installments.
    ///
    /// Idempotent: when nothing differs the negotiation is returned as
    /// stored, without a write or an audit record.
    pub async fn reconcile(&self, actor: &Actor, negotiation_id: &str) -> LedgerResult<Outcome<Negotiation>> {
        validate_actor(&actor.id, &actor.role)?;

        let committed = self
            .ctx
            .retry
            .run("reconcile", move || self.try_reconcile(negotiation_id))
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_reconcile(&self, negotiation_id: &str) -> LedgerResult<Committed<Negotiation>> {
        let db = &self.ctx.db;
        let guard = self.ctx.locks.acquire(negotiation_id).await?;
        let mut tx = db.begin().await?;

        let before = db.negotiations().require(&mut *tx, negotiation_id).await?;
        let mut after = before.clone();
        if !reconcile_in_tx(db, &mut tx, &mut after).await? {
            return Ok(Committed::new(before, guard));
        }

        after.updated_at = Utc::now();
        after.version = db.negotiations().update(&mut *tx, &after).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            negotiation_id = %after.id,
            total_paid = %after.total_paid(),
            percent_paid = %after.percent_paid(),
            "Negotiation reconciled"
        );

        let entry = AuditEntry::update(EntityType::Negotiation, &after.id, &before, &after)
            .with_metadata(json!({ "reason": "reconcile" }));
        Ok(Committed::new(after, guard).audit(entry))
    }

    /// Aggregates as they would be after reconciling, without writing them.
    pub async fn preview(&self, negotiation_id: &str) -> LedgerResult<NegotiationAggregates> {
        let db = &self.ctx.db;
        let negotiation = db.negotiations().require(db.pool(), negotiation_id).await?;
        let amounts = db
            .installments()
            .amounts_for_negotiation(db.pool(), negotiation_id)
            .await?;
        Ok(compute_aggregates(negotiation.total(), amounts))
    }

    /// True iff the approved amounts of all sources add up to the total,
    /// within the configured epsilon.
    pub async fn can_close_financially(&self, negotiation_id: &str) -> LedgerResult<bool> {
        let db = &self.ctx.db;
        let negotiation = db.negotiations().require(db.pool(), negotiation_id).await?;
        let totals = db.payment_sources().totals(db.pool(), negotiation_id).await?;
        Ok(can_close_financially(
            negotiation.total(),
            totals.approved,
            self.ctx.settings.epsilon(),
        ))
    }
}
