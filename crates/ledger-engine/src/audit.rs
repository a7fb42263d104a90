//! # Audit Recorder
//!
//! Writes and reads the append-only audit trail.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Mutation Lifecycle                              │
//! │                                                                         │
//! │  lock ──► tx ──► business writes ──► commit                            │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                          tokio::spawn(audit task) ◄── owns lock guard  │
//! │                                        │                                │
//! │                  ┌─────────────────────┴──────────────────┐            │
//! │                  ▼                                        ▼            │
//! │            insert OK                             insert failed         │
//! │                                                  warn! + counter       │
//! │                                                  LedgerWarning         │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                          guard dropped → next mutation may run         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The task runs to completion even when the caller stops waiting.
//!
//! ## Read Path
//! Histories are streamed in pages keyed by the record sequence, so a stream
//! can be restarted from the last sequence a consumer saw.

use chrono::Utc;
use futures_util::stream::{self, Stream, TryStreamExt};
use ledger_core::audit::{AuditEntry, AuditOperation, AuditRecord, EntityType, ModuleSummary};
use ledger_core::Actor;
use ledger_db::Database;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::lock::NegotiationGuard;
use crate::outcome::{LedgerWarning, Outcome};

/// A committed mutation whose audit records are still to be written.
#[derive(Debug)]
pub(crate) struct Committed<T> {
    pub value: T,
    pub entries: Vec<AuditEntry>,
    pub guard: NegotiationGuard,
}

impl<T> Committed<T> {
    pub fn new(value: T, guard: NegotiationGuard) -> Self {
        Committed {
            value,
            entries: Vec::new(),
            guard,
        }
    }

    pub fn audit(mut self, entry: AuditEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecorder {
    db: Database,
    degraded: Arc<AtomicU64>,
    page_size: u32,
}

impl AuditRecorder {
    pub fn new(db: Database, page_size: u32) -> Self {
        AuditRecorder {
            db,
            degraded: Arc::new(AtomicU64::new(0)),
            page_size: page_size.max(1),
        }
    }

    /// Stores one audit record.
    ///
    /// The diff is computed when the entry is an update with both snapshots.
    ///
    /// ## Errors
    /// Never fails the caller's operation: a storage failure is logged,
    /// counted and handed back as a warning.
    pub async fn record(&self, actor: &Actor, entry: AuditEntry) -> Result<AuditRecord, LedgerWarning> {
        let entity_type = entry.entity_type;
        let entity_id = entry.entity_id.clone();
        let operation = entry.operation;

        let mut record = entry.into_record(Uuid::new_v4().to_string(), actor, Utc::now());

        match self.db.audit_log().insert(self.db.pool(), &record).await {
            Ok(seq) => {
                record.seq = seq;
                debug!(seq, entity_type = %entity_type, entity_id = %entity_id, "Audit record stored");
                Ok(record)
            }
            Err(e) => Err(self.degrade(entity_type, entity_id, operation, e.to_string())),
        }
    }

    /// Number of audit records lost since start-up.
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(
        &self,
        entity_type: EntityType,
        entity_id: String,
        operation: AuditOperation,
        reason: String,
    ) -> LedgerWarning {
        self.degraded.fetch_add(1, Ordering::Relaxed);
        warn!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            ?operation,
            reason = %reason,
            "Audit write failed; business change kept"
        );
        LedgerWarning::AuditDegraded {
            entity_type,
            entity_id,
            operation,
            reason,
        }
    }

    /// Writes the audit records of a committed mutation on a detached task
    /// and releases the negotiation lock once they are stored.
    pub(crate) async fn finish<T>(&self, actor: &Actor, committed: Committed<T>) -> Outcome<T> {
        let Committed {
            value,
            entries,
            guard,
        } = committed;

        let keys: Vec<(EntityType, String, AuditOperation)> = entries
            .iter()
            .map(|e| (e.entity_type, e.entity_id.clone(), e.operation))
            .collect();

        let recorder = self.clone();
        let actor = actor.clone();
        let task = tokio::spawn(async move {
            let mut warnings = Vec::new();
            for entry in entries {
                if let Err(warning) = recorder.record(&actor, entry).await {
                    warnings.push(warning);
                }
            }
            drop(guard);
            warnings
        });

        let warnings = match task.await {
            Ok(warnings) => warnings,
            Err(e) => keys
                .into_iter()
                .map(|(entity_type, entity_id, operation)| {
                    self.degrade(entity_type, entity_id, operation, e.to_string())
                })
                .collect(),
        };

        Outcome::with_warnings(value, warnings)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The full history of one entity, oldest first.
    ///
    /// Lazy: pages are fetched as the stream is polled. Finite: it ends at
    /// the last record present when the final page was read.
    pub fn query_history(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> impl Stream<Item = LedgerResult<AuditRecord>> + Send + 'static {
        self.query_history_after(entity_type, entity_id, 0)
    }

    /// Resumes a history stream after the record with sequence `after_seq`.
    pub fn query_history_after(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        after_seq: i64,
    ) -> impl Stream<Item = LedgerResult<AuditRecord>> + Send + 'static {
        let db = self.db.clone();
        let entity_id = entity_id.into();
        let page_size = self.page_size;

        stream::try_unfold(Some(after_seq), move |cursor| {
            let db = db.clone();
            let entity_id = entity_id.clone();
            async move {
                let Some(after) = cursor else {
                    return Ok::<_, LedgerError>(None);
                };
                let page = db
                    .audit_log()
                    .history_page(db.pool(), entity_type, &entity_id, after, page_size)
                    .await?;
                if page.is_empty() {
                    return Ok(None);
                }

                let next = match page.last() {
                    Some(last) if page.len() as u32 == page_size => Some(last.seq),
                    _ => None,
                };
                let items = stream::iter(page.into_iter().map(Ok::<_, LedgerError>));
                Ok(Some((items, next)))
            }
        })
        .try_flatten()
    }

    /// Most recent records across the ledger, newest first.
    pub async fn recent_changes(&self, limit: u32) -> LedgerResult<Vec<AuditRecord>> {
        Ok(self.db.audit_log().recent(self.db.pool(), limit).await?)
    }

    /// Most recent records written by one actor, newest first.
    pub async fn actor_activity(&self, actor_id: &str, limit: u32) -> LedgerResult<Vec<AuditRecord>> {
        Ok(self.db.audit_log().by_actor(self.db.pool(), actor_id, limit).await?)
    }

    /// Activity figures per module tag.
    pub async fn module_summary(&self) -> LedgerResult<Vec<ModuleSummary>> {
        Ok(self.db.audit_log().module_summary(self.db.pool()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::NegotiationLocks;
    use futures_util::StreamExt;
    use ledger_db::DbConfig;
    use serde_json::json;
    use std::time::Duration;

    async fn recorder(page_size: u32) -> AuditRecorder {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        AuditRecorder::new(db, page_size)
    }

    fn actor() -> Actor {
        Actor::new("user-1", "advisor")
    }

    #[tokio::test]
    async fn test_record_assigns_seq_and_diff() {
        let audit = recorder(100).await;
        let record = audit
            .record(
                &actor(),
                AuditEntry::update(
                    EntityType::PaymentSource,
                    "s1",
                    &json!({"approved": 1, "entity": "Bank"}),
                    &json!({"approved": 2, "entity": "Bank"}),
                ),
            )
            .await
            .unwrap();
        assert!(record.seq > 0);
        assert_eq!(record.actor_role, "advisor");
        let diff = record.diff.unwrap();
        assert_eq!(diff.len(), 1);
        assert!(diff.contains_key("approved"));
    }

    #[tokio::test]
    async fn test_history_stream_spans_pages_and_restarts() {
        let audit = recorder(2).await;
        for i in 0..5 {
            audit
                .record(&actor(), AuditEntry::create(EntityType::Negotiation, "n1", &json!({"i": i})))
                .await
                .unwrap();
        }
        audit
            .record(&actor(), AuditEntry::create(EntityType::Negotiation, "n2", &json!({})))
            .await
            .unwrap();

        let all: Vec<AuditRecord> = audit
            .query_history(EntityType::Negotiation, "n1")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

        let rest: Vec<AuditRecord> = audit
            .query_history_after(EntityType::Negotiation, "n1", all[2].seq)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].seq, all[3].seq);

        let first = audit
            .query_history(EntityType::Negotiation, "n1")
            .boxed()
            .next()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.seq, all[0].seq);
    }

    #[tokio::test]
    async fn test_failed_write_degrades_instead_of_failing() {
        let audit = recorder(100).await;
        sqlx::query("DROP TABLE audit_log")
            .execute(audit.db.pool())
            .await
            .unwrap();

        let result = audit
            .record(&actor(), AuditEntry::create(EntityType::Installment, "i1", &json!({})))
            .await;
        assert!(matches!(result, Err(LedgerWarning::AuditDegraded { .. })));
        assert_eq!(audit.degraded_count(), 1);
    }

    #[tokio::test]
    async fn test_finish_releases_lock_after_writing() {
        let audit = recorder(100).await;
        let locks = NegotiationLocks::new(Duration::from_secs(5));
        let guard = locks.acquire("n1").await.unwrap();

        let committed = Committed::new("done", guard)
            .audit(AuditEntry::create(EntityType::Negotiation, "n1", &json!({})))
            .audit(AuditEntry::update(
                EntityType::Negotiation,
                "n1",
                &json!({"v": 1}),
                &json!({"v": 2}),
            ));
        let outcome = audit.finish(&actor(), committed).await;
        assert_eq!(outcome.value, "done");
        assert!(!outcome.is_degraded());

        assert!(locks.acquire("n1").await.is_ok());
        let history: Vec<AuditRecord> = audit
            .query_history(EntityType::Negotiation, "n1")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].operation, AuditOperation::Create);
    }
}
