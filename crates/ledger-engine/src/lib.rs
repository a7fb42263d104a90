//! # ledger-engine: Services of the Negotiation Ledger
//!
//! This crate runs every ledger mutation and query: it validates input,
//! serializes writers per negotiation, applies the pure rules of
//! `ledger-core` inside a `ledger-db` transaction and records the audit
//! trail afterwards.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ledger (facade)                                │
//! │                                                                         │
//! │  ┌────────────────┐ ┌────────────────┐ ┌────────────────────────────┐  │
//! │  │ Negotiation    │ │ SourceManager  │ │ InstallmentRecorder        │  │
//! │  │ Service        │ │                │ │                            │  │
//! │  │ create, terms  │ │ add / update / │ │ disbursements, adjustments │  │
//! │  │                │ │ remove, totals │ │ reference codes, reports   │  │
//! │  └───────┬────────┘ └───────┬────────┘ └─────────────┬──────────────┘  │
//! │          │                  │                        │                  │
//! │  ┌───────┴────────┐ ┌───────┴────────┐               │                  │
//! │  │ Reconciler     │ │ NegotiationState│◄─────────────┘ auto-complete    │
//! │  │ aggregates     │ │ Machine        │                                  │
//! │  └───────┬────────┘ └───────┬────────┘                                  │
//! │          │                  │                                           │
//! │  ┌───────▼──────────────────▼──────────────────────────────────────┐   │
//! │  │  LedgerContext                                                   │   │
//! │  │  NegotiationLocks · RetryPolicy · AuditRecorder · Database      │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Every mutation returns Outcome<T>: the value plus any                 │
//! │  LedgerWarning::AuditDegraded raised while writing its audit records.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`ledger`] - `Ledger` facade
//! - [`negotiations`] - Negotiation intake and terms
//! - [`sources`] - Payment Source Manager
//! - [`installments`] - Installment Recorder
//! - [`reconciler`] - Aggregate Reconciler
//! - [`lifecycle`] - Negotiation State Machine
//! - [`versions`] - Negotiation versions of terms and sources
//! - [`audit`] - Audit Recorder (detached writes, history streams)
//! - [`lock`] - Per-negotiation async locks
//! - [`retry`] - Bounded retry with exponential backoff
//! - [`config`] - TOML configuration
//! - [`error`] - `LedgerError` and error codes
//! - [`outcome`] - `Outcome<T>` and warnings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_engine::{Ledger, LedgerConfig, NewInstallment};
//!
//! let ledger = Ledger::open(&LedgerConfig::load(None)?).await?;
//! let outcome = ledger.installments().record_installment(&actor, NewInstallment {
//!     negotiation_id,
//!     source_id,
//!     amount: Money::from_units(60_000_000),
//!     disbursed_on: today,
//!     method: PaymentMethod::BankTransfer,
//!     notes: None,
//!     external_reference: Some("TRX-88812".into()),
//! }).await?;
//! println!("{}", outcome.value.installment.reference_code);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod installments;
pub mod ledger;
pub mod lifecycle;
pub mod lock;
pub mod negotiations;
pub mod outcome;
pub mod reconciler;
pub mod retry;
pub mod sources;
pub mod versions;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::AuditRecorder;
pub use config::{AuditSettings, ConcurrencySettings, DatabaseSettings, LedgerConfig, LedgerSettings};
pub use context::LedgerContext;
pub use error::{ErrorBody, ErrorCode, LedgerError, LedgerResult};
pub use installments::{InstallmentRecorder, NewAdjustment, NewInstallment, RecordedInstallment};
pub use ledger::Ledger;
pub use lifecycle::NegotiationStateMachine;
pub use lock::{NegotiationGuard, NegotiationLocks};
pub use negotiations::{NegotiationFilter, NegotiationService, NewNegotiation, TermsUpdate};
pub use outcome::{LedgerWarning, Outcome};
pub use reconciler::Reconciler;
pub use retry::RetryPolicy;
pub use sources::{NewSource, SourceManager, SourceUpdate};
pub use versions::VersionService;

pub use ledger_core::state_machine::TransitionRequest;
pub use ledger_core::versioning::{ChangeType, NegotiationVersion, VersionComparison};
