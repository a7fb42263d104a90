//! Shared handles every ledger service runs on.

use ledger_db::Database;
use std::sync::Arc;

use crate::audit::AuditRecorder;
use crate::config::{LedgerConfig, LedgerSettings};
use crate::lock::NegotiationLocks;
use crate::retry::RetryPolicy;

/// Database, locks, retry policy and audit recorder shared by the services.
///
/// Cheap to clone: every service holds its own copy.
#[derive(Debug, Clone)]
pub struct LedgerContext {
    pub(crate) db: Database,
    pub(crate) settings: Arc<LedgerSettings>,
    pub(crate) locks: NegotiationLocks,
    pub(crate) retry: RetryPolicy,
    pub(crate) audit: AuditRecorder,
}

impl LedgerContext {
    pub fn new(db: Database, config: &LedgerConfig) -> Self {
        LedgerContext {
            audit: AuditRecorder::new(db.clone(), config.audit.page_size),
            locks: NegotiationLocks::new(config.concurrency.lock_timeout()),
            retry: RetryPolicy::from_settings(&config.concurrency),
            settings: Arc::new(config.ledger.clone()),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }
}
