//! # Reference Counter Repository
//!
//! Atomic per-(negotiation, year, month) counters backing installment
//! reference codes.
//!
//! ## Allocation
//! ```text
//! INSERT ... VALUES (neg, 2026, 10, 1)
//! ON CONFLICT DO UPDATE SET last_value = last_value + 1
//! RETURNING last_value
//!
//!   first call  → 1
//!   second call → 2
//!   new month   → 1 again
//! ```
//! A single statement allocates the value, so two transactions can never
//! read the same counter and both increment it.

use sqlx::{Executor, Sqlite};
use tracing::debug;

use crate::error::DbResult;

/// Repository for reference counter operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceCounterRepository;

impl ReferenceCounterRepository {
    pub fn new() -> Self {
        ReferenceCounterRepository
    }

    /// Allocates the next sequence value for a negotiation and month.
    ///
    /// Called inside the recording transaction, so a rolled-back recording
    /// gives its value back.
    pub async fn next<'e, E>(&self, exec: E, negotiation_id: &str, year: i32, month: u32) -> DbResult<u32>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reference_counters (negotiation_id, year, month, last_value)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT (negotiation_id, year, month)
            DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(negotiation_id)
        .bind(year)
        .bind(month as i64)
        .fetch_one(exec)
        .await?;

        debug!(negotiation_id = %negotiation_id, year, month, value, "Allocated reference sequence");
        Ok(value as u32)
    }

    /// Last allocated value, 0 when the month has none yet.
    pub async fn current<'e, E>(&self, exec: E, negotiation_id: &str, year: i32, month: u32) -> DbResult<u32>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT last_value FROM reference_counters WHERE negotiation_id = ?1 AND year = ?2 AND month = ?3",
        )
        .bind(negotiation_id)
        .bind(year)
        .bind(month as i64)
        .fetch_optional(exec)
        .await?;
        Ok(value.unwrap_or(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, negotiation};

    #[tokio::test]
    async fn test_next_is_sequential_per_month() {
        let db = db().await;
        let neg = negotiation("c", "u", 1_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.reference_counters();

        assert_eq!(repo.current(db.pool(), &neg.id, 2026, 10).await.unwrap(), 0);
        assert_eq!(repo.next(db.pool(), &neg.id, 2026, 10).await.unwrap(), 1);
        assert_eq!(repo.next(db.pool(), &neg.id, 2026, 10).await.unwrap(), 2);
        assert_eq!(repo.next(db.pool(), &neg.id, 2026, 11).await.unwrap(), 1);
        assert_eq!(repo.current(db.pool(), &neg.id, 2026, 10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_counters_are_per_negotiation() {
        let db = db().await;
        let a = negotiation("c", "u1", 1_000);
        let b = negotiation("c", "u2", 1_000);
        db.negotiations().insert(db.pool(), &a).await.unwrap();
        db.negotiations().insert(db.pool(), &b).await.unwrap();
        let repo = db.reference_counters();

        repo.next(db.pool(), &a.id, 2026, 10).await.unwrap();
        repo.next(db.pool(), &a.id, 2026, 10).await.unwrap();
        assert_eq!(repo.next(db.pool(), &b.id, 2026, 10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rolled_back_allocation_is_reused() {
        let db = db().await;
        let neg = negotiation("c", "u", 1_000);
        db.negotiations().insert(db.pool(), &neg).await.unwrap();
        let repo = db.reference_counters();

        {
            let mut tx = db.begin().await.unwrap();
            assert_eq!(repo.next(&mut *tx, &neg.id, 2026, 10).await.unwrap(), 1);
        }
        assert_eq!(repo.next(db.pool(), &neg.id, 2026, 10).await.unwrap(), 1);
    }
}
