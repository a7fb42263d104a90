//! # Negotiation Repository
//!
//! Database operations for negotiations.
//!
//! ## Versioned Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every UPDATE is conditional on the version the writer read:            │
//! │                                                                         │
//! │    UPDATE negotiations SET ..., version = version + 1                   │
//! │    WHERE id = ?1 AND version = ?2                                       │
//! │                                                                         │
//! │  0 rows affected → DbError::VersionConflict (someone else wrote first)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Executor, Sqlite};
use tracing::debug;

use crate::error::{DbError, DbResult};
use ledger_core::{Negotiation, NegotiationStatus};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, client_id, housing_unit_id,
        negotiated_price_cents, discount_cents, total_cents,
        total_paid_cents, balance_due_cents, percent_paid_bps,
        notes, status, cancellation_reason, cancelled_at,
        financial_closing_at, activated_at, completed_at,
        created_at, updated_at, version
    FROM negotiations
"#;

/// Repository for negotiation database operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiationRepository;

impl NegotiationRepository {
    pub fn new() -> Self {
        NegotiationRepository
    }

    /// Inserts a new negotiation.
    pub async fn insert<'e, E>(&self, exec: E, negotiation: &Negotiation) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(id = %negotiation.id, client_id = %negotiation.client_id, "Inserting negotiation");

        sqlx::query(
            r#"
            INSERT INTO negotiations (
                id, client_id, housing_unit_id,
                negotiated_price_cents, discount_cents, total_cents,
                total_paid_cents, balance_due_cents, percent_paid_bps,
                notes, status, cancellation_reason, cancelled_at,
                financial_closing_at, activated_at, completed_at,
                created_at, updated_at, version
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, ?16,
                ?17, ?18, ?19
            )
            "#,
        )
        .bind(&negotiation.id)
        .bind(&negotiation.client_id)
        .bind(&negotiation.housing_unit_id)
        .bind(negotiation.negotiated_price_cents)
        .bind(negotiation.discount_cents)
        .bind(negotiation.total_cents)
        .bind(negotiation.total_paid_cents)
        .bind(negotiation.balance_due_cents)
        .bind(negotiation.percent_paid_bps)
        .bind(&negotiation.notes)
        .bind(negotiation.status)
        .bind(&negotiation.cancellation_reason)
        .bind(negotiation.cancelled_at)
        .bind(negotiation.financial_closing_at)
        .bind(negotiation.activated_at)
        .bind(negotiation.completed_at)
        .bind(negotiation.created_at)
        .bind(negotiation.updated_at)
        .bind(negotiation.version)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Gets a negotiation by ID.
    pub async fn get<'e, E>(&self, exec: E, id: &str) -> DbResult<Option<Negotiation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let negotiation = sqlx::query_as::<_, Negotiation>(&sql)
            .bind(id)
            .fetch_optional(exec)
            .await?;
        Ok(negotiation)
    }

    /// Gets a negotiation by ID or fails with NotFound.
    pub async fn require<'e, E>(&self, exec: E, id: &str) -> DbResult<Negotiation>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.get(exec, id)
            .await?
            .ok_or_else(|| DbError::not_found("Negotiation", id))
    }

    /// Finds a non-terminal negotiation for the same client and housing unit.
    pub async fn find_open<'e, E>(
        &self,
        exec: E,
        client_id: &str,
        housing_unit_id: &str,
    ) -> DbResult<Option<Negotiation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE client_id = ?1 AND housing_unit_id = ?2 \
             AND status IN ('drafting', 'financial_closing', 'active', 'suspended') \
             ORDER BY created_at DESC LIMIT 1"
        );
        let negotiation = sqlx::query_as::<_, Negotiation>(&sql)
            .bind(client_id)
            .bind(housing_unit_id)
            .fetch_optional(exec)
            .await?;
        Ok(negotiation)
    }

    /// Lists negotiations, newest first, optionally filtered by status,
    /// client and housing unit.
    pub async fn list<'e, E>(
        &self,
        exec: E,
        status: Option<NegotiationStatus>,
        client_id: Option<&str>,
        housing_unit_id: Option<&str>,
        limit: u32,
    ) -> DbResult<Vec<Negotiation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR client_id = ?2) \
             AND (?3 IS NULL OR housing_unit_id = ?3) \
             ORDER BY created_at DESC, id LIMIT ?4"
        );
        let negotiations = sqlx::query_as::<_, Negotiation>(&sql)
            .bind(status)
            .bind(client_id)
            .bind(housing_unit_id)
            .bind(limit as i64)
            .fetch_all(exec)
            .await?;
        Ok(negotiations)
    }

    /// Writes every mutable column, conditional on `negotiation.version`.
    ///
    /// ## Returns
    /// The new version. The caller's value still carries the old one.
    pub async fn update<'e, E>(&self, exec: E, negotiation: &Negotiation) -> DbResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(
            id = %negotiation.id,
            status = %negotiation.status,
            version = negotiation.version,
            "Updating negotiation"
        );

        let result = sqlx::query(
            r#"
            UPDATE negotiations SET
                negotiated_price_cents = ?3,
                discount_cents = ?4,
                total_cents = ?5,
                total_paid_cents = ?6,
                balance_due_cents = ?7,
                percent_paid_bps = ?8,
                notes = ?9,
                status = ?10,
                cancellation_reason = ?11,
                cancelled_at = ?12,
                financial_closing_at = ?13,
                activated_at = ?14,
                completed_at = ?15,
                updated_at = ?16,
                version = version + 1
            WHERE id = ?1 AND version = ?2
            "#,
        )
        .bind(&negotiation.id)
        .bind(negotiation.version)
        .bind(negotiation.negotiated_price_cents)
        .bind(negotiation.discount_cents)
        .bind(negotiation.total_cents)
        .bind(negotiation.total_paid_cents)
        .bind(negotiation.balance_due_cents)
        .bind(negotiation.percent_paid_bps)
        .bind(&negotiation.notes)
        .bind(negotiation.status)
        .bind(&negotiation.cancellation_reason)
        .bind(negotiation.cancelled_at)
        .bind(negotiation.financial_closing_at)
        .bind(negotiation.activated_at)
        .bind(negotiation.completed_at)
        .bind(negotiation.updated_at)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::version_conflict(
                "Negotiation",
                &negotiation.id,
                negotiation.version,
            ));
        }

        Ok(negotiation.version + 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, db, negotiation};

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = db().await;
        let repo = db.negotiations();
        let neg = negotiation("client-1", "unit-1", 10_000);

        repo.insert(db.pool(), &neg).await.unwrap();
        let loaded = repo.get(db.pool(), &neg.id).await.unwrap().unwrap();
        assert_eq!(loaded, neg);

        assert!(repo.get(db.pool(), "missing").await.unwrap().is_none());
        assert!(matches!(
            repo.require(db.pool(), "missing").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let db = db().await;
        let repo = db.negotiations();
        let mut neg = negotiation("client-1", "unit-1", 10_000);
        repo.insert(db.pool(), &neg).await.unwrap();

        neg.status = NegotiationStatus::FinancialClosing;
        neg.financial_closing_at = Some(at(2));
        let version = repo.update(db.pool(), &neg).await.unwrap();
        assert_eq!(version, 2);

        let loaded = repo.require(db.pool(), &neg.id).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.status, NegotiationStatus::FinancialClosing);
        assert_eq!(loaded.financial_closing_at, Some(at(2)));
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let db = db().await;
        let repo = db.negotiations();
        let neg = negotiation("client-1", "unit-1", 10_000);
        repo.insert(db.pool(), &neg).await.unwrap();

        repo.update(db.pool(), &neg).await.unwrap();
        // Same (now stale) version again
        let err = repo.update(db.pool(), &neg).await.unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { expected: 1, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_find_open_ignores_terminal() {
        let db = db().await;
        let repo = db.negotiations();

        let mut closed = negotiation("client-1", "unit-1", 10_000);
        closed.status = NegotiationStatus::Cancelled;
        repo.insert(db.pool(), &closed).await.unwrap();
        assert!(repo
            .find_open(db.pool(), "client-1", "unit-1")
            .await
            .unwrap()
            .is_none());

        let open = negotiation("client-1", "unit-1", 10_000);
        repo.insert(db.pool(), &open).await.unwrap();
        let found = repo.find_open(db.pool(), "client-1", "unit-1").await.unwrap();
        assert_eq!(found.map(|n| n.id), Some(open.id));

        assert!(repo
            .find_open(db.pool(), "client-1", "unit-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = db().await;
        let repo = db.negotiations();

        let a = negotiation("client-1", "unit-1", 10_000);
        let mut b = negotiation("client-2", "unit-2", 20_000);
        b.status = NegotiationStatus::Active;
        repo.insert(db.pool(), &a).await.unwrap();
        repo.insert(db.pool(), &b).await.unwrap();

        assert_eq!(repo.list(db.pool(), None, None, None, 50).await.unwrap().len(), 2);
        let active = repo
            .list(db.pool(), Some(NegotiationStatus::Active), None, None, 50)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);

        let by_client = repo.list(db.pool(), None, Some("client-1"), None, 50).await.unwrap();
        assert_eq!(by_client.len(), 1);
        assert_eq!(by_client[0].id, a.id);

        let by_unit = repo.list(db.pool(), None, None, Some("unit-2"), 50).await.unwrap();
        assert_eq!(by_unit.len(), 1);
        assert_eq!(by_unit[0].id, b.id);
        assert!(repo
            .list(db.pool(), None, Some("client-1"), Some("unit-2"), 50)
            .await
            .unwrap()
            .is_empty());

        assert_eq!(repo.list(db.pool(), None, None, None, 1).await.unwrap().len(), 1);
    }
}
