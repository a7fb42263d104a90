//! # Negotiation Version Repository
//!
//! Storage for the numbered snapshots of a negotiation's terms.
//!
//! ## Opening a Version
//! ```text
//! inside the mutation's transaction:
//!
//!   next_number(neg)        MAX(version_number) + 1
//!   supersede(neg)          UPDATE ... SET is_active = 0 WHERE is_active = 1
//!   insert(version)         new row, is_active = 1
//!
//! UNIQUE (negotiation_id, version_number) rejects two writers that computed
//! the same number; the partial index keeps a single active row.
//! ```

use sqlx::{Executor, FromRow, Sqlite};
use tracing::debug;

use crate::error::{DbError, DbResult};
use ledger_core::versioning::{ChangeType, NegotiationVersion, SourceSnapshot};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, negotiation_id, version_number,
        negotiated_price_cents, discount_cents, total_cents,
        sources_json, change_type, change_motive, recorded_by,
        is_active, created_at
    FROM negotiation_versions
"#;

#[derive(Debug, FromRow)]
struct VersionRow {
    id: String,
    negotiation_id: String,
    version_number: i64,
    negotiated_price_cents: i64,
    discount_cents: i64,
    total_cents: i64,
    sources_json: String,
    change_type: ChangeType,
    change_motive: String,
    recorded_by: String,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<VersionRow> for NegotiationVersion {
    type Error = DbError;

    fn try_from(row: VersionRow) -> DbResult<Self> {
        let sources: Vec<SourceSnapshot> = serde_json::from_str(&row.sources_json).map_err(|e| {
            DbError::Internal(format!("invalid sources_json in version {}: {e}", row.id))
        })?;
        Ok(NegotiationVersion {
            id: row.id,
            negotiation_id: row.negotiation_id,
            version_number: row.version_number,
            negotiated_price_cents: row.negotiated_price_cents,
            discount_cents: row.discount_cents,
            total_cents: row.total_cents,
            sources,
            change_type: row.change_type,
            change_motive: row.change_motive,
            recorded_by: row.recorded_by,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// Repository for negotiation versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiationVersionRepository;

impl NegotiationVersionRepository {
    pub fn new() -> Self {
        NegotiationVersionRepository
    }

    /// The number the next version of `negotiation_id` gets.
    pub async fn next_number<'e, E>(&self, exec: E, negotiation_id: &str) -> DbResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM negotiation_versions WHERE negotiation_id = ?1",
        )
        .bind(negotiation_id)
        .fetch_one(exec)
        .await?;
        Ok(next)
    }

    /// Clears the active flag of the negotiation's current version.
    pub async fn supersede<'e, E>(&self, exec: E, negotiation_id: &str) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE negotiation_versions SET is_active = 0 WHERE negotiation_id = ?1 AND is_active = 1",
        )
        .bind(negotiation_id)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn insert<'e, E>(&self, exec: E, version: &NegotiationVersion) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(
            negotiation_id = %version.negotiation_id,
            version_number = version.version_number,
            change_type = %version.change_type,
            "Inserting negotiation version"
        );

        let sources_json = serde_json::to_string(&version.sources)
            .map_err(|e| DbError::Internal(format!("cannot encode sources_json: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO negotiation_versions (
                id, negotiation_id, version_number,
                negotiated_price_cents, discount_cents, total_cents,
                sources_json, change_type, change_motive, recorded_by,
                is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&version.id)
        .bind(&version.negotiation_id)
        .bind(version.version_number)
        .bind(version.negotiated_price_cents)
        .bind(version.discount_cents)
        .bind(version.total_cents)
        .bind(sources_json)
        .bind(version.change_type)
        .bind(&version.change_motive)
        .bind(&version.recorded_by)
        .bind(version.is_active)
        .bind(version.created_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Versions of a negotiation, newest first.
    pub async fn history<'e, E>(&self, exec: E, negotiation_id: &str, limit: u32) -> DbResult<Vec<NegotiationVersion>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE negotiation_id = ?1 ORDER BY version_number DESC LIMIT ?2");
        let rows = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(negotiation_id)
            .bind(limit as i64)
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(NegotiationVersion::try_from).collect()
    }

    pub async fn active<'e, E>(&self, exec: E, negotiation_id: &str) -> DbResult<Option<NegotiationVersion>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE negotiation_id = ?1 AND is_active = 1");
        sqlx::query_as::<_, VersionRow>(&sql)
            .bind(negotiation_id)
            .fetch_optional(exec)
            .await?
            .map(NegotiationVersion::try_from)
            .transpose()
    }

    /// Gets one version by number or fails with NotFound.
    pub async fn require<'e, E>(&self, exec: E, negotiation_id: &str, version_number: i64) -> DbResult<NegotiationVersion>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE negotiation_id = ?1 AND version_number = ?2");
        sqlx::query_as::<_, VersionRow>(&sql)
            .bind(negotiation_id)
            .bind(version_number)
            .fetch_optional(exec)
            .await?
            .map(NegotiationVersion::try_from)
            .transpose()?
            .ok_or_else(|| {
                DbError::not_found("NegotiationVersion", format!("{negotiation_id} v{version_number}"))
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, db, negotiation, source};
    use ledger_core::SourceKind;

    fn version(neg: &ledger_core::Negotiation, number: i64, sources: &[ledger_core::PaymentSource]) -> NegotiationVersion {
        NegotiationVersion::capture(
            format!("{}-v{number}", neg.id),
            neg,
            sources,
            number,
            if number == 1 { ChangeType::InitialCreation } else { ChangeType::SourceModification },
            "terms agreed".to_string(),
            "user-1".to_string(),
            at(number as u32),
        )
    }

    #[tokio::test]
    async fn test_versions_chain_with_single_active() {
        let db = db().await;
        let neg = negotiation("client-1", "unit-1", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.negotiation_versions();

        assert_eq!(repo.next_number(db.pool(), &neg.id).await.unwrap(), 1);
        repo.insert(db.pool(), &version(&neg, 1, &[])).await.unwrap();

        let mortgage = source(&neg.id, SourceKind::MortgageLoan, 10_000);
        let mut tx = db.begin().await.unwrap();
        let next = repo.next_number(&mut *tx, &neg.id).await.unwrap();
        repo.supersede(&mut *tx, &neg.id).await.unwrap();
        repo.insert(&mut *tx, &version(&neg, next, &[mortgage])).await.unwrap();
        tx.commit().await.unwrap();

        let history = repo.history(db.pool(), &neg.id, 50).await.unwrap();
        assert_eq!(history.iter().map(|v| v.version_number).collect::<Vec<_>>(), vec![2, 1]);
        assert!(history[0].is_active && !history[1].is_active);
        assert_eq!(history[0].sources.len(), 1);
        assert_eq!(history[0].sources[0].kind, SourceKind::MortgageLoan);

        let active = repo.active(db.pool(), &neg.id).await.unwrap().unwrap();
        assert_eq!(active.version_number, 2);
        assert_eq!(repo.require(db.pool(), &neg.id, 1).await.unwrap().change_type, ChangeType::InitialCreation);
        assert!(matches!(
            repo.require(db.pool(), &neg.id, 9).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_number_and_second_active_are_rejected() {
        let db = db().await;
        let neg = negotiation("client-1", "unit-1", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.negotiation_versions();
        repo.insert(db.pool(), &version(&neg, 1, &[])).await.unwrap();

        let mut same_number = version(&neg, 1, &[]);
        same_number.id = "other".to_string();
        same_number.is_active = false;
        let err = repo.insert(db.pool(), &same_number).await.unwrap_err();
        assert!(err.is_unique_violation());

        // Not superseded first: two active rows
        let err = repo.insert(db.pool(), &version(&neg, 2, &[])).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_versions_are_immutable() {
        let db = db().await;
        let neg = negotiation("client-1", "unit-1", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        db.negotiation_versions()
            .insert(db.pool(), &version(&neg, 1, &[]))
            .await
            .unwrap();

        let edit = sqlx::query("UPDATE negotiation_versions SET total_cents = 1")
            .execute(db.pool())
            .await;
        assert!(edit.is_err());
        let delete = sqlx::query("DELETE FROM negotiation_versions").execute(db.pool()).await;
        assert!(delete.is_err());
    }
}
