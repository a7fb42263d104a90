//! # Negotiation Versions
//!
//! Opens a new version of a negotiation's terms whenever price, discount or
//! payment sources change, and reads the version history back.
//!
//! ```text
//! create ─────────► v1 initial_creation
//! add_source ─────► v2 source_modification   (motive generated)
//! update_terms ───► v3 <caller's change type> (caller's motive)
//! update_source ──► v4 <caller's change type> (caller's motive)
//! remove_source ──► v5 source_modification   (motive generated)
//! ```
//!
//! Versions are written inside the mutation's transaction: a rolled back
//! change leaves no version behind.

use chrono::{DateTime, Utc};
use ledger_core::validation::validate_id;
use ledger_core::versioning::{compare_versions, ChangeType, NegotiationVersion, DEFAULT_VERSION_HISTORY_LIMIT};
use ledger_core::{Negotiation, VersionComparison};
use ledger_db::Database;
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::context::LedgerContext;
use crate::error::LedgerResult;

/// Type and motive of a change that opens a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VersionChange {
    pub change_type: ChangeType,
    pub motive: String,
}

impl VersionChange {
    pub fn new(change_type: ChangeType, motive: impl Into<String>) -> Self {
        VersionChange {
            change_type,
            motive: motive.into(),
        }
    }
}

/// Supersedes the active version of `negotiation` and stores the next one,
/// snapshotting the sources visible on `conn`.
pub(crate) async fn open_version(
    db: &Database,
    conn: &mut SqliteConnection,
    negotiation: &Negotiation,
    change: &VersionChange,
    recorded_by: &str,
    now: DateTime<Utc>,
) -> LedgerResult<NegotiationVersion> {
    let repo = db.negotiation_versions();
    let sources = db
        .payment_sources()
        .list_for_negotiation(&mut *conn, &negotiation.id)
        .await?;
    let number = repo.next_number(&mut *conn, &negotiation.id).await?;

    let version = NegotiationVersion::capture(
        Uuid::new_v4().to_string(),
        negotiation,
        &sources,
        number,
        change.change_type,
        change.motive.clone(),
        recorded_by.to_string(),
        now,
    );
    repo.supersede(&mut *conn, &negotiation.id).await?;
    repo.insert(&mut *conn, &version).await?;

    debug!(
        negotiation_id = %negotiation.id,
        version_number = number,
        change_type = %change.change_type,
        "Negotiation version opened"
    );
    Ok(version)
}

/// Audit metadata pointing at the version a change opened.
pub(crate) fn version_metadata(version: &NegotiationVersion) -> Value {
    json!({
        "version_number": version.version_number,
        "change_type": version.change_type,
        "change_motive": version.change_motive,
    })
}

#[derive(Debug, Clone)]
pub struct VersionService {
    ctx: LedgerContext,
}

impl VersionService {
    pub fn new(ctx: LedgerContext) -> Self {
        VersionService { ctx }
    }

    /// Versions of a negotiation, newest first, at most `limit` (default 50).
    pub async fn history(&self, negotiation_id: &str, limit: Option<u32>) -> LedgerResult<Vec<NegotiationVersion>> {
        validate_id("negotiation_id", negotiation_id)?;
        let db = &self.ctx.db;
        db.negotiations().require(db.pool(), negotiation_id).await?;
        Ok(db
            .negotiation_versions()
            .history(db.pool(), negotiation_id, limit.unwrap_or(DEFAULT_VERSION_HISTORY_LIMIT))
            .await?)
    }

    /// The version currently in force, `None` for negotiations stored
    /// before versioning existed.
    pub async fn active_version(&self, negotiation_id: &str) -> LedgerResult<Option<NegotiationVersion>> {
        validate_id("negotiation_id", negotiation_id)?;
        let db = &self.ctx.db;
        db.negotiations().require(db.pool(), negotiation_id).await?;
        Ok(db.negotiation_versions().active(db.pool(), negotiation_id).await?)
    }

    pub async fn get_version(&self, negotiation_id: &str, version_number: i64) -> LedgerResult<NegotiationVersion> {
        let db = &self.ctx.db;
        Ok(db
            .negotiation_versions()
            .require(db.pool(), negotiation_id, version_number)
            .await?)
    }

    /// Changes in terms and sources from version `from` to version `to`.
    ///
    /// ## Errors
    /// `NotFound` when either version does not exist.
    pub async fn compare(&self, negotiation_id: &str, from: i64, to: i64) -> LedgerResult<VersionComparison> {
        validate_id("negotiation_id", negotiation_id)?;
        let older = self.get_version(negotiation_id, from).await?;
        let newer = self.get_version(negotiation_id, to).await?;
        let comparison = compare_versions(&older, &newer);

        debug!(
            negotiation_id = %negotiation_id,
            from,
            to,
            changed = comparison.changes.len(),
            "Negotiation versions compared"
        );
        Ok(comparison)
    }
}
