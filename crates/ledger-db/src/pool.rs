//! # Ledger Database Handle
//!
//! Opens the SQLite file behind the ledger and hands out repositories and
//! transactions.
//!
//! ## Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database (SqlitePool)                              │
//! │                                                                         │
//! │  reads                               mutations                          │
//! │  ─────                               ─────────                          │
//! │  db.negotiations()                   let mut tx = db.begin()            │
//! │    .get(db.pool(), id)                 negotiation row                  │
//! │       │                                payment source row               │
//! │       │  one pooled connection         installment row                  │
//! │       │  per statement                 reference counter                │
//! │       ▼                              tx.commit()  (all or nothing)      │
//! │  latest committed state                                                 │
//! │                                                                         │
//! │  audit_log rows are written through the pool after the commit, so a    │
//! │  failing audit insert never rolls back ledger state.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLite Settings
//! WAL journal, `synchronous = NORMAL`, foreign keys on and a busy timeout
//! so concurrent writers wait for the file lock instead of failing at once.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::audit::AuditLogRepository;
use crate::repository::installment::InstallmentRepository;
use crate::repository::negotiation::NegotiationRepository;
use crate::repository::payment_source::PaymentSourceRepository;
use crate::repository::reference_counter::ReferenceCounterRepository;
use crate::repository::version::NegotiationVersionRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the ledger lives and how the pool behaves.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new(data_dir.join("ledger.db"))
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Default: 5. Forced to 1 for in-memory databases.
    pub max_connections: u32,

    /// Wait for a free pooled connection. Default: 30 seconds.
    pub acquire_timeout: Duration,

    /// Wait on a locked database file before SQLITE_BUSY. Default: 5 seconds.
    pub busy_timeout: Duration,

    /// Apply pending migrations when connecting. Default: true.
    pub run_migrations: bool,
}

impl DbConfig {
    /// The file is created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// A private in-memory ledger, used by tests.
    ///
    /// The database exists only while its single connection is open, so
    /// every statement and transaction queues for that connection.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            ..DbConfig::new(IN_MEMORY)
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the ledger database. Clones share the pool.
///
/// ## Usage
/// ```rust,ignore
/// let source = db.payment_sources().require(db.pool(), &source_id).await?;
///
/// let mut tx = db.begin().await?;
/// db.installments().insert(&mut *tx, &installment).await?;
/// db.payment_sources().update(&mut *tx, &updated_source).await?;
/// db.negotiations().update(&mut *tx, &negotiation).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the database and applies migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening ledger database");

        let url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout);

        // Recycling the only connection would drop an in-memory database
        if config.is_in_memory() {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Ledger pool ready");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Executor for reads outside a transaction.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a transaction holding one connection until commit or drop.
    /// Dropping it uncommitted rolls back.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(|e| match DbError::from(e) {
            retryable @ (DbError::PoolExhausted | DbError::Busy(_)) => retryable,
            other => DbError::TransactionFailed(other.to_string()),
        })
    }

    pub fn negotiations(&self) -> NegotiationRepository {
        NegotiationRepository::new()
    }

    pub fn payment_sources(&self) -> PaymentSourceRepository {
        PaymentSourceRepository::new()
    }

    pub fn installments(&self) -> InstallmentRepository {
        InstallmentRepository::new()
    }

    pub fn reference_counters(&self) -> ReferenceCounterRepository {
        ReferenceCounterRepository::new()
    }

    pub fn audit_log(&self) -> AuditLogRepository {
        AuditLogRepository::new()
    }

    pub fn negotiation_versions(&self) -> NegotiationVersionRepository {
        NegotiationVersionRepository::new()
    }

    /// Closes the pool; later queries fail with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing ledger database");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_has_schema() {
        let config = DbConfig::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 1);

        let db = Database::new(config).await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite%' AND name != '_sqlx_migrations'
             ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "audit_log",
                "installments",
                "negotiation_versions",
                "negotiations",
                "payment_sources",
                "reference_counters",
            ]
        );
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/ledger-test.db")
            .max_connections(10)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(config.run_migrations);
        assert!(!config.is_in_memory());
    }

    #[tokio::test]
    async fn test_transaction_rollback_on_drop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        {
            let mut tx = db.begin().await.unwrap();
            sqlx::query("CREATE TABLE scratch (x INTEGER)")
                .execute(&mut *tx)
                .await
                .unwrap();
        }
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'scratch'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(exists, 0);
    }

    #[tokio::test]
    async fn test_close() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
        db.close().await;
        assert!(!db.health_check().await);
    }
}
