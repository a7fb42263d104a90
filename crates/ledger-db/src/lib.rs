//! # ledger-db: Storage Layer for the Negotiation Ledger
//!
//! SQLite storage for negotiations, payment sources, installments,
//! reference counters and the audit log, through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ledger Data Flow                                 │
//! │                                                                         │
//! │  ledger-engine (record_installment, transition, ...)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ledger-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories   │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                 │   │  (embedded)  │  │   │
//! │  │   │               │    │ NegotiationRepo │   │              │  │   │
//! │  │   │ SqlitePool    │    │ PaymentSource.. │   │ 001_initial  │  │   │
//! │  │   │ begin() → tx  │◄───│ InstallmentRepo │   │   _schema    │  │   │
//! │  │   │               │    │ RefCounterRepo  │   │              │  │   │
//! │  │   │               │    │ AuditLogRepo    │   │ 002_versions │  │   │
//! │  │   │               │    │ VersionRepo     │   │              │  │   │
//! │  │   └───────────────┘    └─────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/ledger.db  or  :memory:                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation, configuration and transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! db.installments().insert(&mut *tx, &installment).await?;
//! db.payment_sources().update(&mut *tx, &source).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    AuditLogRepository, InstallmentRepository, NegotiationRepository, NegotiationVersionRepository,
    PaymentSourceRepository, ReferenceCounterRepository,
};

/// SQLite transaction handle returned by [`Database::begin`].
pub type DbTransaction = sqlx::Transaction<'static, sqlx::Sqlite>;
