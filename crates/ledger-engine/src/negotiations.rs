//! # Negotiation Intake
//!
//! Opens negotiations and edits their terms while they are drafted.
//!
//! A client holds at most one open negotiation per housing unit. Creation
//! is serialized on the (client, unit) pair, so two concurrent requests for
//! the same pair cannot both pass the duplicate check.

use chrono::Utc;
use ledger_core::audit::{AuditEntry, EntityType};
use ledger_core::validation::{
    validate_actor, validate_change_motive, validate_id, validate_notes, validate_price_and_discount,
};
use ledger_core::{Actor, ChangeType, ConflictError, Money, Negotiation, NegotiationStatus, Percentage};
use ledger_db::DbError;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::audit::Committed;
use crate::context::LedgerContext;
use crate::error::LedgerResult;
use crate::outcome::Outcome;
use crate::reconciler::reconcile_in_tx;
use crate::versions::{open_version, version_metadata, VersionChange};

/// Motive stored with the first version of every negotiation.
const INITIAL_VERSION_MOTIVE: &str = "Negotiation opened";

/// Default page size of [`NegotiationService::list`].
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Input of [`NegotiationService::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNegotiation {
    pub client_id: String,
    pub housing_unit_id: String,
    pub negotiated_price: Money,
    pub discount: Money,
    pub notes: Option<String>,
}

/// Terms to change while drafting. `None` keeps the stored value.
///
/// `change_motive` is required. A change of price or discount opens a new
/// negotiation version tagged with `change_type` and the motive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermsUpdate {
    pub negotiated_price: Option<Money>,
    pub discount: Option<Money>,
    pub notes: Option<String>,
    pub change_type: ChangeType,
    pub change_motive: String,
}

/// Filter of [`NegotiationService::list`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NegotiationFilter {
    pub status: Option<NegotiationStatus>,
    pub client_id: Option<String>,
    pub housing_unit_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NegotiationService {
    ctx: LedgerContext,
}

impl NegotiationService {
    pub fn new(ctx: LedgerContext) -> Self {
        NegotiationService { ctx }
    }

    /// Opens a negotiation in `Drafting` with nothing paid.
    ///
    /// ## Errors
    /// - `Validation` for a negative price or discount, or a discount not
    ///   below the price
    /// - `Conflict::DuplicateOpenNegotiation` when the client already has a
    ///   non-terminal negotiation for the unit
    pub async fn create(&self, actor: &Actor, input: NewNegotiation) -> LedgerResult<Outcome<Negotiation>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("client_id", &input.client_id)?;
        validate_id("housing_unit_id", &input.housing_unit_id)?;
        let total = validate_price_and_discount(input.negotiated_price, input.discount)?;
        let notes = validate_notes(input.notes.as_deref())?;

        let now = Utc::now();
        let negotiation = Negotiation {
            id: Uuid::new_v4().to_string(),
            client_id: input.client_id,
            housing_unit_id: input.housing_unit_id,
            negotiated_price_cents: input.negotiated_price.cents(),
            discount_cents: input.discount.cents(),
            total_cents: total.cents(),
            total_paid_cents: 0,
            balance_due_cents: total.cents(),
            percent_paid_bps: Percentage::zero().bps() as i64,
            notes,
            status: NegotiationStatus::Drafting,
            cancellation_reason: None,
            cancelled_at: None,
            financial_closing_at: None,
            activated_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let negotiation = &negotiation;

        let committed = self
            .ctx
            .retry
            .run("create_negotiation", move || self.try_create(actor, negotiation))
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_create(&self, actor: &Actor, negotiation: &Negotiation) -> LedgerResult<Committed<Negotiation>> {
        let db = &self.ctx.db;
        let key = format!("intake:{}:{}", negotiation.client_id, negotiation.housing_unit_id);
        let guard = self.ctx.locks.acquire(&key).await?;
        let mut tx = db.begin().await?;

        if let Some(existing) = db
            .negotiations()
            .find_open(&mut *tx, &negotiation.client_id, &negotiation.housing_unit_id)
            .await?
        {
            return Err(ConflictError::DuplicateOpenNegotiation {
                client_id: negotiation.client_id.clone(),
                housing_unit_id: negotiation.housing_unit_id.clone(),
                existing_id: existing.id,
            }
            .into());
        }

        db.negotiations().insert(&mut *tx, negotiation).await?;
        let initial = VersionChange::new(ChangeType::InitialCreation, INITIAL_VERSION_MOTIVE);
        let version = open_version(db, &mut tx, negotiation, &initial, &actor.id, negotiation.created_at).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            negotiation_id = %negotiation.id,
            client_id = %negotiation.client_id,
            housing_unit_id = %negotiation.housing_unit_id,
            total = %negotiation.total(),
            "Negotiation created"
        );

        let entry = AuditEntry::create(EntityType::Negotiation, &negotiation.id, negotiation)
            .with_metadata(version_metadata(&version));
        Ok(Committed::new(negotiation.clone(), guard).audit(entry))
    }

    /// Changes price, discount or notes of a drafted negotiation and
    /// recomputes its total and aggregates.
    ///
    /// ## Errors
    /// - `Validation` for a blank `change_motive` or invalid price/discount
    /// - `Conflict::TermsFrozen` once the negotiation left `Drafting`
    pub async fn update_terms(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        update: TermsUpdate,
    ) -> LedgerResult<Outcome<Negotiation>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("negotiation_id", negotiation_id)?;
        let change = VersionChange::new(update.change_type, validate_change_motive(&update.change_motive)?);
        let (update, change) = (&update, &change);

        let committed = self
            .ctx
            .retry
            .run("update_terms", move || {
                self.try_update_terms(actor, negotiation_id, update, change)
            })
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_update_terms(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        update: &TermsUpdate,
        change: &VersionChange,
    ) -> LedgerResult<Committed<Negotiation>> {
        let db = &self.ctx.db;
        let guard = self.ctx.locks.acquire(negotiation_id).await?;
        let mut tx = db.begin().await?;

        let before = db.negotiations().require(&mut *tx, negotiation_id).await?;
        if before.status != NegotiationStatus::Drafting {
            return Err(ConflictError::TermsFrozen {
                negotiation_id: before.id,
                status: before.status,
            }
            .into());
        }

        let price = update.negotiated_price.unwrap_or_else(|| before.negotiated_price());
        let discount = update.discount.unwrap_or_else(|| before.discount());
        let total = validate_price_and_discount(price, discount)?;

        let mut after = before.clone();
        after.negotiated_price_cents = price.cents();
        after.discount_cents = discount.cents();
        after.total_cents = total.cents();
        if update.notes.is_some() {
            after.notes = validate_notes(update.notes.as_deref())?;
        }
        reconcile_in_tx(db, &mut tx, &mut after).await?;

        if after == before {
            return Ok(Committed::new(before, guard));
        }

        after.updated_at = Utc::now();
        after.version = db.negotiations().update(&mut *tx, &after).await?;
        let terms_changed = after.negotiated_price_cents != before.negotiated_price_cents
            || after.discount_cents != before.discount_cents;
        let version = if terms_changed {
            Some(open_version(db, &mut tx, &after, change, &actor.id, after.updated_at).await?)
        } else {
            None
        };
        tx.commit().await.map_err(DbError::from)?;

        info!(
            negotiation_id = %after.id,
            total = %after.total(),
            change_type = %change.change_type,
            version_number = ?version.as_ref().map(|v| v.version_number),
            "Negotiation terms updated"
        );

        let mut entry = AuditEntry::update(EntityType::Negotiation, &after.id, &before, &after);
        if let Some(version) = &version {
            entry = entry.with_metadata(version_metadata(version));
        }
        Ok(Committed::new(after, guard).audit(entry))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, negotiation_id: &str) -> LedgerResult<Negotiation> {
        let db = &self.ctx.db;
        Ok(db.negotiations().require(db.pool(), negotiation_id).await?)
    }

    /// Negotiations matching `filter`, newest first.
    pub async fn list(&self, filter: &NegotiationFilter) -> LedgerResult<Vec<Negotiation>> {
        let db = &self.ctx.db;
        Ok(db
            .negotiations()
            .list(
                db.pool(),
                filter.status,
                filter.client_id.as_deref(),
                filter.housing_unit_id.as_deref(),
                filter.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            )
            .await?)
    }
}
