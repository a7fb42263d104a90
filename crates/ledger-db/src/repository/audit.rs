//! # Audit Log Repository
//!
//! Append-only storage for audit records.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AuditRecord                 audit_log row                              │
//! │  ─────────────────────────   ─────────────────────────────────────────  │
//! │  seq                     ←   seq INTEGER PRIMARY KEY AUTOINCREMENT      │
//! │  before / after (Value)  →   before_json / after_json TEXT             │
//! │  diff (BTreeMap)         →   diff_json TEXT                            │
//! │  metadata (Value)        →   metadata_json TEXT                        │
//! │                                                                         │
//! │  UPDATE / DELETE are rejected by triggers.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Histories are read with keyset pagination on `seq`, so a page boundary
//! never skips or repeats a record while new ones are being appended.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Executor, FromRow, Sqlite};
use tracing::debug;

use crate::error::{DbError, DbResult};
use ledger_core::audit::{AuditOperation, AuditRecord, EntityType, ModuleSummary, ModuleTag};

const SELECT_COLUMNS: &str = r#"
    SELECT
        seq, id, entity_type, entity_id, operation,
        actor_id, actor_role, recorded_at,
        before_json, after_json, diff_json, metadata_json, module
    FROM audit_log
"#;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct AuditRow {
    seq: i64,
    id: String,
    entity_type: EntityType,
    entity_id: String,
    operation: AuditOperation,
    actor_id: String,
    actor_role: String,
    recorded_at: DateTime<Utc>,
    before_json: Option<String>,
    after_json: Option<String>,
    diff_json: Option<String>,
    metadata_json: Option<String>,
    module: ModuleTag,
}

fn decode_json<T: DeserializeOwned>(column: &str, raw: Option<String>) -> DbResult<Option<T>> {
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| DbError::Internal(format!("invalid {column} in audit_log: {e}")))
    })
    .transpose()
}

fn encode_json<T: Serialize>(column: &str, value: Option<&T>) -> DbResult<Option<String>> {
    value
        .map(|v| {
            serde_json::to_string(v)
                .map_err(|e| DbError::Internal(format!("cannot encode {column}: {e}")))
        })
        .transpose()
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = DbError;

    fn try_from(row: AuditRow) -> DbResult<Self> {
        Ok(AuditRecord {
            seq: row.seq,
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            operation: row.operation,
            actor_id: row.actor_id,
            actor_role: row.actor_role,
            recorded_at: row.recorded_at,
            before: decode_json("before_json", row.before_json)?,
            after: decode_json("after_json", row.after_json)?,
            diff: decode_json("diff_json", row.diff_json)?,
            metadata: decode_json("metadata_json", row.metadata_json)?,
            module: row.module,
        })
    }
}

fn into_records(rows: Vec<AuditRow>) -> DbResult<Vec<AuditRecord>> {
    rows.into_iter().map(AuditRecord::try_from).collect()
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the audit log.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogRepository;

impl AuditLogRepository {
    pub fn new() -> Self {
        AuditLogRepository
    }

    /// Appends a record and returns its assigned sequence number.
    ///
    /// The record's own `seq` is ignored.
    pub async fn insert<'e, E>(&self, exec: E, record: &AuditRecord) -> DbResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        debug!(
            id = %record.id,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            "Appending audit record"
        );

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_log (
                id, entity_type, entity_id, operation,
                actor_id, actor_role, recorded_at,
                before_json, after_json, diff_json, metadata_json, module
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING seq
            "#,
        )
        .bind(&record.id)
        .bind(record.entity_type)
        .bind(&record.entity_id)
        .bind(record.operation)
        .bind(&record.actor_id)
        .bind(&record.actor_role)
        .bind(record.recorded_at)
        .bind(encode_json("before_json", record.before.as_ref())?)
        .bind(encode_json("after_json", record.after.as_ref())?)
        .bind(encode_json("diff_json", record.diff.as_ref())?)
        .bind(encode_json("metadata_json", record.metadata.as_ref())?)
        .bind(record.module)
        .fetch_one(exec)
        .await?;

        Ok(seq)
    }

    /// One page of an entity's history in insertion order, strictly after `after_seq`.
    pub async fn history_page<'e, E>(
        &self,
        exec: E,
        entity_type: EntityType,
        entity_id: &str,
        after_seq: i64,
        limit: u32,
    ) -> DbResult<Vec<AuditRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE entity_type = ?1 AND entity_id = ?2 AND seq > ?3 \
             ORDER BY seq ASC LIMIT ?4"
        );
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(entity_type)
            .bind(entity_id)
            .bind(after_seq)
            .bind(limit as i64)
            .fetch_all(exec)
            .await?;
        into_records(rows)
    }

    /// Most recent records across all entities, newest first.
    pub async fn recent<'e, E>(&self, exec: E, limit: u32) -> DbResult<Vec<AuditRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} ORDER BY seq DESC LIMIT ?1");
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(limit as i64)
            .fetch_all(exec)
            .await?;
        into_records(rows)
    }

    /// Most recent records written by one actor, newest first.
    pub async fn by_actor<'e, E>(&self, exec: E, actor_id: &str, limit: u32) -> DbResult<Vec<AuditRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{SELECT_COLUMNS} WHERE actor_id = ?1 ORDER BY seq DESC LIMIT ?2");
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(actor_id)
            .bind(limit as i64)
            .fetch_all(exec)
            .await?;
        into_records(rows)
    }

    /// Number of records about one entity.
    pub async fn count_for_entity<'e, E>(
        &self,
        exec: E,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DbResult<u32>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(exec)
        .await?;
        Ok(count as u32)
    }

    /// Activity per module, ordered by module.
    pub async fn module_summary<'e, E>(&self, exec: E) -> DbResult<Vec<ModuleSummary>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            ModuleTag,
            i64,
            i64,
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        )> = sqlx::query_as(
            r#"
            SELECT
                module,
                COUNT(*),
                COUNT(DISTINCT actor_id),
                SUM(CASE WHEN operation = 'create' THEN 1 ELSE 0 END),
                SUM(CASE WHEN operation = 'update' THEN 1 ELSE 0 END),
                SUM(CASE WHEN operation = 'delete' THEN 1 ELSE 0 END),
                MIN(recorded_at),
                MAX(recorded_at)
            FROM audit_log
            GROUP BY module
            ORDER BY module
            "#,
        )
        .fetch_all(exec)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(module, events, actors, creates, updates, deletes, first, last)| ModuleSummary {
                    module,
                    event_count: events as u32,
                    distinct_actors: actors as u32,
                    creates: creates as u32,
                    updates: updates as u32,
                    deletes: deletes as u32,
                    first_event_at: first,
                    last_event_at: last,
                },
            )
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, db};
    use ledger_core::audit::AuditEntry;
    use ledger_core::Actor;
    use serde_json::json;
    use uuid::Uuid;

    fn record(entry: AuditEntry, actor: &str, day: u32) -> AuditRecord {
        entry.into_record(
            Uuid::new_v4().to_string(),
            &Actor::new(actor, "advisor"),
            at(day),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_seq_and_round_trips() {
        let db = db().await;
        let repo = db.audit_log();

        let created = record(
            AuditEntry::create(EntityType::PaymentSource, "s1", &json!({"approved": 100})),
            "user-1",
            1,
        );
        let updated = record(
            AuditEntry::update(
                EntityType::PaymentSource,
                "s1",
                &json!({"approved": 100}),
                &json!({"approved": 150}),
            )
            .with_metadata(json!({"reason": "re-appraisal"})),
            "user-1",
            2,
        );

        let first = repo.insert(db.pool(), &created).await.unwrap();
        let second = repo.insert(db.pool(), &updated).await.unwrap();
        assert!(second > first);

        let history = repo
            .history_page(db.pool(), EntityType::PaymentSource, "s1", 0, 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].seq, first);
        assert_eq!(history[1].diff.as_ref().unwrap()["approved"].after, json!(150));
        assert_eq!(history[1].metadata, Some(json!({"reason": "re-appraisal"})));
        assert_eq!(history[1].module, ModuleTag::Payments);
        assert_eq!(history[0].before, None);

        let mut expected = updated.clone();
        expected.seq = second;
        assert_eq!(history[1], expected);
    }

    #[tokio::test]
    async fn test_history_pages_by_seq() {
        let db = db().await;
        let repo = db.audit_log();
        for day in 1..=5 {
            let entry = AuditEntry::create(EntityType::Negotiation, "n1", &json!({"day": day}));
            repo.insert(db.pool(), &record(entry, "user-1", day)).await.unwrap();
        }
        let other = AuditEntry::create(EntityType::Negotiation, "n2", &json!({}));
        repo.insert(db.pool(), &record(other, "user-1", 1)).await.unwrap();

        let page1 = repo
            .history_page(db.pool(), EntityType::Negotiation, "n1", 0, 2)
            .await
            .unwrap();
        let page2 = repo
            .history_page(db.pool(), EntityType::Negotiation, "n1", page1[1].seq, 10)
            .await
            .unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 3);
        assert!(page2[0].seq > page1[1].seq);
        assert_eq!(
            repo.count_for_entity(db.pool(), EntityType::Negotiation, "n1")
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_recent_and_by_actor() {
        let db = db().await;
        let repo = db.audit_log();
        repo.insert(
            db.pool(),
            &record(AuditEntry::create(EntityType::Negotiation, "n1", &json!({})), "ana", 1),
        )
        .await
        .unwrap();
        repo.insert(
            db.pool(),
            &record(AuditEntry::create(EntityType::Installment, "i1", &json!({})), "luis", 2),
        )
        .await
        .unwrap();

        let recent = repo.recent(db.pool(), 10).await.unwrap();
        assert_eq!(recent[0].entity_id, "i1");
        assert_eq!(recent[1].entity_id, "n1");

        let ana = repo.by_actor(db.pool(), "ana", 10).await.unwrap();
        assert_eq!(ana.len(), 1);
        assert_eq!(ana[0].actor_id, "ana");
    }

    #[tokio::test]
    async fn test_module_summary() {
        let db = db().await;
        let repo = db.audit_log();
        let entries = [
            (AuditEntry::create(EntityType::Negotiation, "n1", &json!({})), "ana", 1),
            (
                AuditEntry::update(EntityType::Negotiation, "n1", &json!({"a": 1}), &json!({"a": 2})),
                "luis",
                3,
            ),
            (AuditEntry::create(EntityType::PaymentSource, "s1", &json!({})), "ana", 2),
            (AuditEntry::delete(EntityType::PaymentSource, "s1", &json!({})), "ana", 4),
        ];
        for (entry, actor, day) in entries {
            repo.insert(db.pool(), &record(entry, actor, day)).await.unwrap();
        }

        let summary = repo.module_summary(db.pool()).await.unwrap();
        assert_eq!(summary.len(), 2);

        let negotiations = &summary[0];
        assert_eq!(negotiations.module, ModuleTag::Negotiations);
        assert_eq!(negotiations.event_count, 2);
        assert_eq!(negotiations.distinct_actors, 2);
        assert_eq!((negotiations.creates, negotiations.updates), (1, 1));
        assert_eq!(negotiations.first_event_at, Some(at(1)));
        assert_eq!(negotiations.last_event_at, Some(at(3)));

        let payments = &summary[1];
        assert_eq!(payments.module, ModuleTag::Payments);
        assert_eq!(payments.distinct_actors, 1);
        assert_eq!((payments.creates, payments.deletes), (1, 1));
    }

    #[tokio::test]
    async fn test_audit_log_is_append_only() {
        let db = db().await;
        let repo = db.audit_log();
        let rec = record(AuditEntry::create(EntityType::Negotiation, "n1", &json!({})), "ana", 1);
        repo.insert(db.pool(), &rec).await.unwrap();

        let result = sqlx::query("DELETE FROM audit_log")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(result, Err(DbError::QueryFailed(_))));
        assert_eq!(repo.recent(db.pool(), 10).await.unwrap().len(), 1);
    }
}
