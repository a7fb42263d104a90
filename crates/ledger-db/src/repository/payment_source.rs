//! # Payment Source Repository
//!
//! Database operations for payment sources.
//!
//! Sources are composed into their negotiation: the foreign key cascades on
//! negotiation delete and `negotiation_id` is never updated.

use sqlx::{Executor, Sqlite};
use tracing::debug;

use crate::error::{DbError, DbResult};
use ledger_core::{Money, PaymentSource, SourceTotals};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, negotiation_id, kind,
        approved_amount_cents, received_amount_cents,
        entity, reference_number, allows_multiple_disbursements,
        status, completed_at, created_at, updated_at
    FROM payment_sources
"#;

/// Repository for payment source database operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentSourceRepository;

impl PaymentSourceRepository {
    pub fn new() -> Self {
        PaymentSourceRepository
    }

    /// Inserts a new payment source.
    pub async fn insert<'e, E>(&self, exec: E, source: &PaymentSource) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(
            id = %source.id,
            negotiation_id = %source.negotiation_id,
            kind = %source.kind,
            "Inserting payment source"
        );

        sqlx::query(
            r#"
            INSERT INTO payment_sources (
                id, negotiation_id, kind,
                approved_amount_cents, received_amount_cents,
                entity, reference_number, allows_multiple_disbursements,
                status, completed_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&source.id)
        .bind(&source.negotiation_id)
        .bind(source.kind)
        .bind(source.approved_amount_cents)
        .bind(source.received_amount_cents)
        .bind(&source.entity)
        .bind(&source.reference_number)
        .bind(source.allows_multiple_disbursements)
        .bind(source.status)
        .bind(source.completed_at)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Gets a payment source by ID.
    pub async fn get<'e, E>(&self, exec: E, id: &str) -> DbResult<Option<PaymentSource>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let source = sqlx::query_as::<_, PaymentSource>(&sql)
            .bind(id)
            .fetch_optional(exec)
            .await?;
        Ok(source)
    }

    /// Gets a payment source by ID or fails with NotFound.
    pub async fn require<'e, E>(&self, exec: E, id: &str) -> DbResult<PaymentSource>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.get(exec, id)
            .await?
            .ok_or_else(|| DbError::not_found("PaymentSource", id))
    }

    /// Lists the sources of a negotiation in creation order.
    pub async fn list_for_negotiation<'e, E>(
        &self,
        exec: E,
        negotiation_id: &str,
    ) -> DbResult<Vec<PaymentSource>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE negotiation_id = ?1 ORDER BY created_at, id");
        let sources = sqlx::query_as::<_, PaymentSource>(&sql)
            .bind(negotiation_id)
            .fetch_all(exec)
            .await?;
        Ok(sources)
    }

    /// Sums approved and received amounts over a negotiation's sources.
    pub async fn totals<'e, E>(&self, exec: E, negotiation_id: &str) -> DbResult<SourceTotals>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let (count, approved, received): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(approved_amount_cents), 0),
                COALESCE(SUM(received_amount_cents), 0)
            FROM payment_sources
            WHERE negotiation_id = ?1
            "#,
        )
        .bind(negotiation_id)
        .fetch_one(exec)
        .await?;

        let approved = Money::from_cents(approved);
        let received = Money::from_cents(received);
        Ok(SourceTotals {
            source_count: count as u32,
            approved,
            received,
            outstanding: approved - received,
        })
    }

    /// Writes the mutable columns of a source.
    pub async fn update<'e, E>(&self, exec: E, source: &PaymentSource) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(
            id = %source.id,
            received_cents = source.received_amount_cents,
            "Updating payment source"
        );

        let result = sqlx::query(
            r#"
            UPDATE payment_sources SET
                approved_amount_cents = ?2,
                received_amount_cents = ?3,
                entity = ?4,
                reference_number = ?5,
                status = ?6,
                completed_at = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&source.id)
        .bind(source.approved_amount_cents)
        .bind(source.received_amount_cents)
        .bind(&source.entity)
        .bind(&source.reference_number)
        .bind(source.status)
        .bind(source.completed_at)
        .bind(source.updated_at)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PaymentSource", &source.id));
        }
        Ok(())
    }

    /// Deletes a payment source.
    pub async fn delete<'e, E>(&self, exec: E, id: &str) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(id = %id, "Deleting payment source");

        let result = sqlx::query("DELETE FROM payment_sources WHERE id = ?1")
            .bind(id)
            .execute(exec)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PaymentSource", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, db, negotiation, source};
    use ledger_core::{SourceKind, SourceStatus};

    #[tokio::test]
    async fn test_insert_get_list() {
        let db = db().await;
        let neg = negotiation("c", "u", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();

        let repo = db.payment_sources();
        let down = source(&neg.id, SourceKind::InitialDownPayment, 4_000);
        let mortgage = source(&neg.id, SourceKind::MortgageLoan, 6_000);
        repo.insert(db.pool(), &down).await.unwrap();
        repo.insert(db.pool(), &mortgage).await.unwrap();

        let loaded = repo.require(db.pool(), &down.id).await.unwrap();
        assert_eq!(loaded, down);
        assert!(loaded.allows_multiple_disbursements);

        let all = repo.list_for_negotiation(db.pool(), &neg.id).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_totals() {
        let db = db().await;
        let neg = negotiation("c", "u", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.payment_sources();

        let empty = repo.totals(db.pool(), &neg.id).await.unwrap();
        assert_eq!(empty, SourceTotals::default());

        let mut down = source(&neg.id, SourceKind::InitialDownPayment, 4_000);
        down.received_amount_cents = 1_000;
        down.status = SourceStatus::InProgress;
        repo.insert(db.pool(), &down).await.unwrap();
        repo.insert(db.pool(), &source(&neg.id, SourceKind::MortgageLoan, 6_000))
            .await
            .unwrap();

        let totals = repo.totals(db.pool(), &neg.id).await.unwrap();
        assert_eq!(totals.source_count, 2);
        assert_eq!(totals.approved, Money::from_cents(10_000));
        assert_eq!(totals.received, Money::from_cents(1_000));
        assert_eq!(totals.outstanding, Money::from_cents(9_000));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = db().await;
        let neg = negotiation("c", "u", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.payment_sources();

        let mut src = source(&neg.id, SourceKind::MortgageLoan, 6_000);
        repo.insert(db.pool(), &src).await.unwrap();

        src.received_amount_cents = 6_000;
        src.status = SourceStatus::Completed;
        src.completed_at = Some(at(3));
        repo.update(db.pool(), &src).await.unwrap();
        assert_eq!(repo.require(db.pool(), &src.id).await.unwrap(), src);

        repo.delete(db.pool(), &src.id).await.unwrap();
        assert!(repo.get(db.pool(), &src.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(db.pool(), &src.id).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_received_cannot_exceed_approved_in_storage() {
        let db = db().await;
        let neg = negotiation("c", "u", 10_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.payment_sources();

        let mut src = source(&neg.id, SourceKind::MortgageLoan, 6_000);
        repo.insert(db.pool(), &src).await.unwrap();
        src.received_amount_cents = 6_001;
        assert!(matches!(
            repo.update(db.pool(), &src).await,
            Err(DbError::QueryFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_source_requires_existing_negotiation() {
        let db = db().await;
        let orphan = source("no-such-negotiation", SourceKind::MortgageLoan, 6_000);
        assert!(matches!(
            db.payment_sources().insert(db.pool(), &orphan).await,
            Err(DbError::ForeignKeyViolation { .. })
        ));
    }
}
