//! # Negotiation State Machine
//!
//! Applies lifecycle transitions against the latest persisted state.
//!
//! ```text
//! lock ──► BEGIN ──► re-read negotiation ──► gather facts ──► plan ──► UPDATE ──► COMMIT
//!                                            (sources,         │
//!                                             installments,    └── InvalidTransition /
//!                                             percent paid)        Validation /
//!                                                                  TransitionNotAllowed
//!                                                                  (no write, no audit)
//! ```

use chrono::Utc;
use ledger_core::audit::{AuditEntry, EntityType};
use ledger_core::reconcile::can_close_financially;
use ledger_core::state_machine::{plan_transition, TransitionFacts, TransitionRequest};
use ledger_core::validation::{validate_actor, validate_id};
use ledger_core::{Actor, Negotiation};
use ledger_db::DbError;
use serde_json::json;
use tracing::info;

use crate::audit::Committed;
use crate::context::LedgerContext;
use crate::error::LedgerResult;
use crate::outcome::Outcome;

#[derive(Debug, Clone)]
pub struct NegotiationStateMachine {
    ctx: LedgerContext,
}

impl NegotiationStateMachine {
    pub fn new(ctx: LedgerContext) -> Self {
        NegotiationStateMachine { ctx }
    }

    /// Moves a negotiation to the state `request` leads to.
    ///
    /// ## Errors
    /// Checked in this order, each before any write:
    /// 1. `Conflict::InvalidTransition` when the pair is not in the table
    /// 2. `Validation` for an empty or over-long motive
    /// 3. `Conflict::TransitionNotAllowed` when the guard does not hold
    pub async fn transition(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        request: TransitionRequest,
    ) -> LedgerResult<Outcome<Negotiation>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("negotiation_id", negotiation_id)?;
        let request = &request;

        let committed = self
            .ctx
            .retry
            .run("transition", move || self.try_transition(negotiation_id, request))
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_transition(
        &self,
        negotiation_id: &str,
        request: &TransitionRequest,
    ) -> LedgerResult<Committed<Negotiation>> {
        let db = &self.ctx.db;
        let guard = self.ctx.locks.acquire(negotiation_id).await?;
        let mut tx = db.begin().await?;

        let current = db.negotiations().require(&mut *tx, negotiation_id).await?;
        let totals = db.payment_sources().totals(&mut *tx, negotiation_id).await?;
        let facts = TransitionFacts {
            source_count: totals.source_count,
            sources_reconcile: can_close_financially(
                current.total(),
                totals.approved,
                self.ctx.settings.epsilon(),
            ),
            installment_count: db.installments().count_for_negotiation(&mut *tx, negotiation_id).await?,
            percent_paid: current.percent_paid(),
        };

        let mut next = plan_transition(&current, request, &facts, Utc::now())?;
        next.version = db.negotiations().update(&mut *tx, &next).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            negotiation_id = %next.id,
            from = %current.status,
            to = %next.status,
            "Negotiation transitioned"
        );

        let entry = AuditEntry::update(EntityType::Negotiation, &next.id, &current, &next).with_metadata(json!({
            "transition": request,
            "from": current.status,
            "to": next.status,
        }));
        Ok(Committed::new(next, guard).audit(entry))
    }

    // =========================================================================
    // Named Transitions
    // =========================================================================

    pub async fn close_financially(&self, actor: &Actor, negotiation_id: &str) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(actor, negotiation_id, TransitionRequest::CloseFinancially)
            .await
    }

    pub async fn activate(&self, actor: &Actor, negotiation_id: &str) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(actor, negotiation_id, TransitionRequest::Activate).await
    }

    pub async fn suspend(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        motive: impl Into<String>,
    ) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(
            actor,
            negotiation_id,
            TransitionRequest::Suspend {
                motive: motive.into(),
            },
        )
        .await
    }

    pub async fn resume(&self, actor: &Actor, negotiation_id: &str) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(actor, negotiation_id, TransitionRequest::Resume).await
    }

    /// `administrative` completes without the fully-paid guard.
    pub async fn complete(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        administrative: bool,
    ) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(
            actor,
            negotiation_id,
            TransitionRequest::Complete { administrative },
        )
        .await
    }

    pub async fn renounce(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        motive: impl Into<String>,
    ) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(
            actor,
            negotiation_id,
            TransitionRequest::Renounce {
                motive: motive.into(),
            },
        )
        .await
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        motive: impl Into<String>,
    ) -> LedgerResult<Outcome<Negotiation>> {
        self.transition(
            actor,
            negotiation_id,
            TransitionRequest::Cancel {
                motive: motive.into(),
            },
        )
        .await
    }
}
