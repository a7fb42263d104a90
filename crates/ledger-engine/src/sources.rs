//! # Payment Source Manager
//!
//! Adds, edits and removes the funding channels of a negotiation.
//!
//! ## Editing Window
//! ```text
//! Drafting ──► FinancialClosing ──► Active ──► ...
//! ├──── sources editable ────────┤  ├── frozen ──►
//!
//! per source:  received == 0  ──► update / remove allowed
//!              received != 0  ──► SourceHasDisbursements
//! ```
//!
//! Every committed add, update or removal opens a new negotiation version
//! snapshotting the sources.

use chrono::Utc;
use ledger_core::audit::{AuditEntry, EntityType};
use ledger_core::validation::{
    validate_actor, validate_change_motive, validate_id, validate_positive_amount, validate_source_fields,
};
use ledger_core::{
    Actor, ChangeType, ConflictError, Money, Negotiation, PaymentSource, SourceKind, SourceStatus,
    SourceTotals,
};
use ledger_db::DbError;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use crate::audit::Committed;
use crate::context::LedgerContext;
use crate::error::LedgerResult;
use crate::outcome::Outcome;
use crate::versions::{open_version, version_metadata, VersionChange};

/// Input of [`SourceManager::add_source`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub negotiation_id: String,
    pub kind: SourceKind,
    pub approved_amount: Money,
    pub entity: Option<String>,
    pub reference_number: Option<String>,
}

/// Fields to change on a source. `None` keeps the stored value.
///
/// For `entity` and `reference_number`, `Some(None)` (`null` in JSON) clears
/// the stored value, subject to what the source kind requires.
/// `change_motive` is required and is stored with the negotiation version
/// the update opens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceUpdate {
    pub approved_amount: Option<Money>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub entity: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<Option<String>>,
    #[serde(default)]
    pub change_type: ChangeType,
    pub change_motive: String,
}

impl SourceUpdate {
    /// True when no source field would change.
    pub fn is_empty(&self) -> bool {
        self.approved_amount.is_none() && self.entity.is_none() && self.reference_number.is_none()
    }
}

/// A field that is present, `null` included, is `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone)]
pub struct SourceManager {
    ctx: LedgerContext,
}

impl SourceManager {
    pub fn new(ctx: LedgerContext) -> Self {
        SourceManager { ctx }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds a payment source in `Pending` state with nothing received.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive amount or a missing entity /
    ///   reference number the kind requires
    /// - `NotFound` when the negotiation does not exist
    /// - `Conflict::SourcesFrozen` once the negotiation is past financial closing
    pub async fn add_source(&self, actor: &Actor, input: NewSource) -> LedgerResult<Outcome<PaymentSource>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("negotiation_id", &input.negotiation_id)?;
        validate_positive_amount("approved_amount", input.approved_amount)?;
        let fields = validate_source_fields(
            input.kind,
            input.entity.as_deref(),
            input.reference_number.as_deref(),
        )?;

        let now = Utc::now();
        let source = PaymentSource {
            id: Uuid::new_v4().to_string(),
            negotiation_id: input.negotiation_id,
            kind: input.kind,
            approved_amount_cents: input.approved_amount.cents(),
            received_amount_cents: 0,
            entity: fields.entity,
            reference_number: fields.reference_number,
            allows_multiple_disbursements: input.kind.allows_multiple_disbursements(),
            status: SourceStatus::Pending,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let source = &source;

        let committed = self
            .ctx
            .retry
            .run("add_source", move || self.try_add(actor, source))
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_add(&self, actor: &Actor, source: &PaymentSource) -> LedgerResult<Committed<PaymentSource>> {
        let db = &self.ctx.db;
        let guard = self.ctx.locks.acquire(&source.negotiation_id).await?;
        let mut tx = db.begin().await?;

        let negotiation = self.editable_negotiation(&mut tx, &source.negotiation_id).await?;
        db.payment_sources().insert(&mut *tx, source).await?;
        let change = VersionChange::new(
            ChangeType::SourceModification,
            format!("Added {} source", source.kind),
        );
        let version = open_version(db, &mut tx, &negotiation, &change, &actor.id, source.created_at).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            source_id = %source.id,
            negotiation_id = %source.negotiation_id,
            kind = %source.kind,
            approved = %source.approved(),
            "Payment source added"
        );

        let entry = AuditEntry::create(EntityType::PaymentSource, &source.id, source)
            .with_metadata(version_metadata(&version));
        Ok(Committed::new(source.clone(), guard).audit(entry))
    }

    /// Changes the approved amount, entity or reference number of a source
    /// that has not received money yet.
    ///
    /// ## Errors
    /// - `Validation` for a blank `change_motive`, a non-positive amount or
    ///   clearing a field the kind requires
    /// - `Conflict::SourceHasDisbursements` once money was recorded
    pub async fn update_source(
        &self,
        actor: &Actor,
        source_id: &str,
        update: SourceUpdate,
    ) -> LedgerResult<Outcome<PaymentSource>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("source_id", source_id)?;
        if let Some(amount) = update.approved_amount {
            validate_positive_amount("approved_amount", amount)?;
        }
        let change = VersionChange::new(update.change_type, validate_change_motive(&update.change_motive)?);

        let db = &self.ctx.db;
        let negotiation_id = db.payment_sources().require(db.pool(), source_id).await?.negotiation_id;
        let (negotiation_id, update, change) = (negotiation_id.as_str(), &update, &change);

        let committed = self
            .ctx
            .retry
            .run("update_source", move || {
                self.try_update(actor, negotiation_id, source_id, update, change)
            })
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_update(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        source_id: &str,
        update: &SourceUpdate,
        change: &VersionChange,
    ) -> LedgerResult<Committed<PaymentSource>> {
        let db = &self.ctx.db;
        let guard = self.ctx.locks.acquire(negotiation_id).await?;
        let mut tx = db.begin().await?;

        let before = db.payment_sources().require(&mut *tx, source_id).await?;
        let negotiation = self.editable_negotiation(&mut tx, &before.negotiation_id).await?;
        ensure_untouched(&before)?;

        let fields = validate_source_fields(
            before.kind,
            resolve(&update.entity, &before.entity),
            resolve(&update.reference_number, &before.reference_number),
        )?;

        let mut after = before.clone();
        if let Some(amount) = update.approved_amount {
            after.approved_amount_cents = amount.cents();
        }
        after.entity = fields.entity;
        after.reference_number = fields.reference_number;

        if after == before {
            return Ok(Committed::new(before, guard));
        }

        after.updated_at = Utc::now();
        db.payment_sources().update(&mut *tx, &after).await?;
        let version = open_version(db, &mut tx, &negotiation, change, &actor.id, after.updated_at).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            source_id = %after.id,
            approved = %after.approved(),
            version_number = version.version_number,
            "Payment source updated"
        );

        let entry = AuditEntry::update(EntityType::PaymentSource, &after.id, &before, &after)
            .with_metadata(version_metadata(&version));
        Ok(Committed::new(after, guard).audit(entry))
    }

    /// Deletes a source that never had money recorded against it.
    pub async fn remove_source(&self, actor: &Actor, source_id: &str) -> LedgerResult<Outcome<PaymentSource>> {
        validate_actor(&actor.id, &actor.role)?;
        validate_id("source_id", source_id)?;

        let db = &self.ctx.db;
        let negotiation_id = db.payment_sources().require(db.pool(), source_id).await?.negotiation_id;
        let negotiation_id = negotiation_id.as_str();

        let committed = self
            .ctx
            .retry
            .run("remove_source", move || self.try_remove(actor, negotiation_id, source_id))
            .await?;
        Ok(self.ctx.audit.finish(actor, committed).await)
    }

    async fn try_remove(
        &self,
        actor: &Actor,
        negotiation_id: &str,
        source_id: &str,
    ) -> LedgerResult<Committed<PaymentSource>> {
        let db = &self.ctx.db;
        let guard = self.ctx.locks.acquire(negotiation_id).await?;
        let mut tx = db.begin().await?;

        let source = db.payment_sources().require(&mut *tx, source_id).await?;
        ensure_untouched(&source)?;
        // Adjustments can bring received back to zero; the entries still exist.
        if db.installments().count_for_source(&mut *tx, source_id).await? > 0 {
            return Err(ConflictError::SourceHasDisbursements {
                source_id: source.id.clone(),
                received: source.received(),
            }
            .into());
        }
        let negotiation = self.editable_negotiation(&mut tx, &source.negotiation_id).await?;

        db.payment_sources().delete(&mut *tx, source_id).await?;
        let change = VersionChange::new(
            ChangeType::SourceModification,
            format!("Removed {} source", source.kind),
        );
        let version = open_version(db, &mut tx, &negotiation, &change, &actor.id, Utc::now()).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(source_id = %source.id, negotiation_id = %source.negotiation_id, "Payment source removed");

        let entry = AuditEntry::delete(EntityType::PaymentSource, &source.id, &source)
            .with_metadata(version_metadata(&version));
        Ok(Committed::new(source, guard).audit(entry))
    }

    /// Loads the negotiation and checks its sources may still change.
    async fn editable_negotiation(
        &self,
        conn: &mut SqliteConnection,
        negotiation_id: &str,
    ) -> LedgerResult<Negotiation> {
        let negotiation = self.ctx.db.negotiations().require(&mut *conn, negotiation_id).await?;
        if !negotiation.status.sources_editable() {
            return Err(ConflictError::SourcesFrozen {
                negotiation_id: negotiation.id,
                status: negotiation.status,
            }
            .into());
        }
        Ok(negotiation)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Approved and received sums across the negotiation's sources.
    pub async fn compute_totals(&self, negotiation_id: &str) -> LedgerResult<SourceTotals> {
        let db = &self.ctx.db;
        db.negotiations().require(db.pool(), negotiation_id).await?;
        Ok(db.payment_sources().totals(db.pool(), negotiation_id).await?)
    }

    pub async fn list_sources(&self, negotiation_id: &str) -> LedgerResult<Vec<PaymentSource>> {
        let db = &self.ctx.db;
        db.negotiations().require(db.pool(), negotiation_id).await?;
        Ok(db
            .payment_sources()
            .list_for_negotiation(db.pool(), negotiation_id)
            .await?)
    }

    pub async fn get_source(&self, source_id: &str) -> LedgerResult<PaymentSource> {
        let db = &self.ctx.db;
        Ok(db.payment_sources().require(db.pool(), source_id).await?)
    }
}

/// The value an optional field ends up with after an update.
fn resolve<'a>(update: &'a Option<Option<String>>, stored: &'a Option<String>) -> Option<&'a str> {
    match update {
        Some(value) => value.as_deref(),
        None => stored.as_deref(),
    }
}

fn ensure_untouched(source: &PaymentSource) -> LedgerResult<()> {
    if source.has_received() {
        return Err(ConflictError::SourceHasDisbursements {
            source_id: source.id.clone(),
            received: source.received(),
        }
        .into());
    }
    Ok(())
}
