//! # Installment Repository
//!
//! Database operations for installments ("abonos").
//!
//! Installments are append-only. There is no update or delete here, and the
//! schema's triggers reject both at the storage level as well.

use sqlx::{Executor, Sqlite};
use tracing::debug;

use crate::error::DbResult;
use ledger_core::{
    Installment, InstallmentFilter, InstallmentStatistics, MethodCount, Money, PaymentMethod,
};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, negotiation_id, source_id, reference_code, kind,
        amount_cents, disbursed_on, method, notes,
        external_reference, recorded_by, created_at
    FROM installments
"#;

/// Repository for installment database operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallmentRepository;

impl InstallmentRepository {
    pub fn new() -> Self {
        InstallmentRepository
    }

    /// Inserts an installment.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when the reference code is already taken
    /// in this negotiation.
    pub async fn insert<'e, E>(&self, exec: E, installment: &Installment) -> DbResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(
            id = %installment.id,
            source_id = %installment.source_id,
            reference_code = %installment.reference_code,
            amount_cents = installment.amount_cents,
            "Inserting installment"
        );

        sqlx::query(
            r#"
            INSERT INTO installments (
                id, negotiation_id, source_id, reference_code, kind,
                amount_cents, disbursed_on, method, notes,
                external_reference, recorded_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&installment.id)
        .bind(&installment.negotiation_id)
        .bind(&installment.source_id)
        .bind(&installment.reference_code)
        .bind(installment.kind)
        .bind(installment.amount_cents)
        .bind(installment.disbursed_on)
        .bind(installment.method)
        .bind(&installment.notes)
        .bind(&installment.external_reference)
        .bind(&installment.recorded_by)
        .bind(installment.created_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Gets an installment by ID.
    pub async fn get<'e, E>(&self, exec: E, id: &str) -> DbResult<Option<Installment>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let installment = sqlx::query_as::<_, Installment>(&sql)
            .bind(id)
            .fetch_optional(exec)
            .await?;
        Ok(installment)
    }

    /// Lists installments matching a filter, newest disbursement first.
    ///
    /// ## Filter Semantics
    /// Every `None` field matches everything; the date range is inclusive.
    pub async fn list<'e, E>(&self, exec: E, filter: &InstallmentFilter) -> DbResult<Vec<Installment>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE (?1 IS NULL OR negotiation_id = ?1) \
             AND (?2 IS NULL OR source_id = ?2) \
             AND (?3 IS NULL OR method = ?3) \
             AND (?4 IS NULL OR disbursed_on >= ?4) \
             AND (?5 IS NULL OR disbursed_on <= ?5) \
             ORDER BY disbursed_on DESC, created_at DESC, reference_code DESC"
        );
        let installments = sqlx::query_as::<_, Installment>(&sql)
            .bind(filter.negotiation_id.as_deref())
            .bind(filter.source_id.as_deref())
            .bind(filter.method)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(exec)
            .await?;
        Ok(installments)
    }

    /// Amounts of every installment of a negotiation, in recording order.
    ///
    /// This is the input of reconciliation.
    pub async fn amounts_for_negotiation<'e, E>(
        &self,
        exec: E,
        negotiation_id: &str,
    ) -> DbResult<Vec<Money>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let amounts: Vec<i64> = sqlx::query_scalar(
            "SELECT amount_cents FROM installments WHERE negotiation_id = ?1 ORDER BY created_at, id",
        )
        .bind(negotiation_id)
        .fetch_all(exec)
        .await?;
        Ok(amounts.into_iter().map(Money::from_cents).collect())
    }

    /// Number of installments recorded against a negotiation.
    pub async fn count_for_negotiation<'e, E>(&self, exec: E, negotiation_id: &str) -> DbResult<u32>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM installments WHERE negotiation_id = ?1")
                .bind(negotiation_id)
                .fetch_one(exec)
                .await?;
        Ok(count as u32)
    }

    /// Number of installments (any kind) recorded against a source.
    pub async fn count_for_source<'e, E>(&self, exec: E, source_id: &str) -> DbResult<u32>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM installments WHERE source_id = ?1")
            .bind(source_id)
            .fetch_one(exec)
            .await?;
        Ok(count as u32)
    }

    /// Number of `disbursement` entries recorded against a source.
    pub async fn count_disbursements<'e, E>(&self, exec: E, source_id: &str) -> DbResult<u32>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM installments WHERE source_id = ?1 AND kind = 'disbursement'",
        )
        .bind(source_id)
        .fetch_one(exec)
        .await?;
        Ok(count as u32)
    }

    /// Count, total, average and per-method breakdown for a negotiation.
    pub async fn statistics<'e, E>(
        &self,
        exec: E,
        negotiation_id: &str,
    ) -> DbResult<InstallmentStatistics>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(Option<PaymentMethod>, i64, i64)> = sqlx::query_as(
            r#"
            SELECT method, COUNT(*), COALESCE(SUM(amount_cents), 0)
            FROM installments
            WHERE negotiation_id = ?1
            GROUP BY method
            "#,
        )
        .bind(negotiation_id)
        .fetch_all(exec)
        .await?;

        let mut by_method: Vec<MethodCount> = rows
            .into_iter()
            .map(|(method, count, total)| MethodCount {
                method,
                count: count as u32,
                total: Money::from_cents(total),
            })
            .collect();
        by_method.sort_by_key(|m| m.method);

        let count: u32 = by_method.iter().map(|m| m.count).sum();
        let total: Money = by_method.iter().map(|m| m.total).sum();
        let average = if count == 0 {
            Money::zero()
        } else {
            Money::from_cents(total.cents() / count as i64)
        };

        Ok(InstallmentStatistics {
            count,
            total,
            average,
            by_method,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::test_support::{at, db, installment, negotiation, source};
    use crate::Database;
    use ledger_core::{InstallmentKind, PaymentSource, SourceKind};

    async fn setup() -> (Database, PaymentSource) {
        let db = db().await;
        let neg = negotiation("c", "u", 100_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let src = source(&neg.id, SourceKind::InitialDownPayment, 100_000);
        db.payment_sources().insert(db.pool(), &src).await.unwrap();
        (db, src)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (db, src) = setup().await;
        let repo = db.installments();

        let inst = installment(&src, "ABO-2026-10-001", 5_000, 3);
        repo.insert(db.pool(), &inst).await.unwrap();
        assert_eq!(repo.get(db.pool(), &inst.id).await.unwrap(), Some(inst));
    }

    #[tokio::test]
    async fn test_reference_code_is_unique_per_negotiation() {
        let (db, src) = setup().await;
        let repo = db.installments();

        repo.insert(db.pool(), &installment(&src, "ABO-2026-10-001", 5_000, 3))
            .await
            .unwrap();
        let err = repo
            .insert(db.pool(), &installment(&src, "ABO-2026-10-001", 7_000, 4))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_installments_are_append_only() {
        let (db, src) = setup().await;
        let inst = installment(&src, "ABO-2026-10-001", 5_000, 3);
        db.installments().insert(db.pool(), &inst).await.unwrap();

        let update = sqlx::query("UPDATE installments SET amount_cents = 1 WHERE id = ?1")
            .bind(&inst.id)
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(update, Err(DbError::QueryFailed(_))));

        let delete = sqlx::query("DELETE FROM installments WHERE id = ?1")
            .bind(&inst.id)
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(delete, Err(DbError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn test_list_filter_and_order() {
        let (db, src) = setup().await;
        let repo = db.installments();

        let early = installment(&src, "ABO-2026-10-001", 1_000, 2);
        let mut cash = installment(&src, "ABO-2026-10-002", 2_000, 9);
        cash.method = Some(PaymentMethod::Cash);
        let late = installment(&src, "ABO-2026-10-003", 3_000, 20);
        for i in [&early, &cash, &late] {
            repo.insert(db.pool(), i).await.unwrap();
        }

        let all = repo.list(db.pool(), &InstallmentFilter::default()).await.unwrap();
        let codes: Vec<_> = all.iter().map(|i| i.reference_code.as_str()).collect();
        assert_eq!(codes, ["ABO-2026-10-003", "ABO-2026-10-002", "ABO-2026-10-001"]);

        let cash_only = repo
            .list(
                db.pool(),
                &InstallmentFilter {
                    method: Some(PaymentMethod::Cash),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cash_only.len(), 1);

        let ranged = repo
            .list(
                db.pool(),
                &InstallmentFilter {
                    source_id: Some(src.id.clone()),
                    from: Some(at(2).date_naive()),
                    to: Some(at(9).date_naive()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ranged.len(), 2);
    }

    #[tokio::test]
    async fn test_counts_and_amounts() {
        let (db, src) = setup().await;
        let repo = db.installments();

        repo.insert(db.pool(), &installment(&src, "ABO-2026-10-001", 5_000, 3))
            .await
            .unwrap();
        let mut adj = installment(&src, "ABO-2026-10-002", -1_000, 4);
        adj.kind = InstallmentKind::Adjustment;
        adj.method = None;
        repo.insert(db.pool(), &adj).await.unwrap();

        assert_eq!(repo.count_for_source(db.pool(), &src.id).await.unwrap(), 2);
        assert_eq!(repo.count_disbursements(db.pool(), &src.id).await.unwrap(), 1);
        assert_eq!(
            repo.count_for_negotiation(db.pool(), &src.negotiation_id).await.unwrap(),
            2
        );
        let amounts = repo
            .amounts_for_negotiation(db.pool(), &src.negotiation_id)
            .await
            .unwrap();
        assert_eq!(amounts.iter().sum::<Money>(), Money::from_cents(4_000));
    }

    #[tokio::test]
    async fn test_statistics() {
        let (db, src) = setup().await;
        let repo = db.installments();

        let empty = repo.statistics(db.pool(), &src.negotiation_id).await.unwrap();
        assert_eq!(empty, InstallmentStatistics::default());

        let mut cash = installment(&src, "ABO-2026-10-001", 1_000, 1);
        cash.method = Some(PaymentMethod::Cash);
        repo.insert(db.pool(), &cash).await.unwrap();
        repo.insert(db.pool(), &installment(&src, "ABO-2026-10-002", 2_000, 2))
            .await
            .unwrap();
        repo.insert(db.pool(), &installment(&src, "ABO-2026-10-003", 4_000, 3))
            .await
            .unwrap();

        let stats = repo.statistics(db.pool(), &src.negotiation_id).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total, Money::from_cents(7_000));
        assert_eq!(stats.average, Money::from_cents(2_333));
        assert_eq!(stats.by_method.len(), 2);
        assert_eq!(stats.by_method[0].method, Some(PaymentMethod::Cash));
        assert_eq!(stats.by_method[1].count, 2);
    }
}
