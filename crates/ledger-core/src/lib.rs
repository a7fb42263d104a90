//! # ledger-core: Pure Rules of the Negotiation Ledger
//!
//! This crate holds the entities and rules of the negotiation financial
//! ledger as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Negotiation Ledger Architecture                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Presentation layer (external)                   │   │
//! │  │     sources form ──► installment form ──► negotiation detail    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ actor id / role on every call         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ledger-engine (services, locks, audit)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ledger-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────────┐ ┌──────────────┐  │   │
//! │  │   │  types   │ │  money   │ │ state_machine│ │  reconcile   │  │   │
//! │  │   │ entities │ │  Money   │ │ table/guards │ │ aggregates   │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────────┘ └──────────────┘  │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────────┐                   │   │
//! │  │   │validation│ │reference │ │    audit     │                   │   │
//! │  │   └──────────┘ └──────────┘ └──────────────┘                   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    ledger-db (Database Layer)                   │   │
//! │  │        SQLite queries, migrations, counters, audit log          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Negotiation, PaymentSource, Installment and read models
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Validation and conflict errors
//! - [`validation`] - Input rules
//! - [`reconcile`] - Aggregate math and source balance rules
//! - [`state_machine`] - Lifecycle transition table and guards
//! - [`reference`] - `PREFIX-YYYY-MM-NNN` reference codes
//! - [`audit`] - Audit records and field-level diffs
//! - [`versioning`] - Numbered snapshots of negotiation terms
//!
//! ## Example Usage
//!
//! ```rust
//! use ledger_core::money::Money;
//! use ledger_core::reconcile::{can_close_financially, compute_aggregates};
//! use ledger_core::RECONCILIATION_EPSILON;
//!
//! let total = Money::from_units(100_000_000);
//! let approved = Money::from_units(60_000_000) + Money::from_units(40_000_000);
//! assert!(can_close_financially(total, approved, RECONCILIATION_EPSILON));
//!
//! let agg = compute_aggregates(total, [Money::from_units(60_000_000)]);
//! assert_eq!(agg.percent_paid.bps(), 6_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod error;
pub mod money;
pub mod reconcile;
pub mod reference;
pub mod state_machine;
pub mod types;
pub mod validation;
pub mod versioning;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ConflictError, CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
pub use versioning::{ChangeType, NegotiationVersion, VersionComparison};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tolerance when comparing approved sums to a negotiation total (0.01).
pub const RECONCILIATION_EPSILON: Money = Money::from_cents(1);

/// Reference-code prefix used when none is configured.
pub const DEFAULT_REFERENCE_PREFIX: &str = "ABO";

/// Highest counter value of a negotiation/month (three digits).
pub const MAX_REFERENCE_SEQUENCE: u32 = 999;

/// Maximum length of caller-supplied notes.
pub const MAX_NOTES_LENGTH: usize = 2000;

/// Maximum length of a motive or adjustment reason.
pub const MAX_MOTIVE_LENGTH: usize = 500;

/// Maximum length of a source's entity name.
pub const MAX_ENTITY_LENGTH: usize = 150;

/// Maximum length of reference numbers.
pub const MAX_REFERENCE_LENGTH: usize = 100;
