//! # Repository Module
//!
//! Database repository implementations for the negotiation ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  ledger-engine service                                                 │
//! │       │                                                                 │
//! │       │  db.payment_sources().get(&mut *tx, id)                        │
//! │       │  db.negotiations().get(db.pool(), id)                          │
//! │       ▼                                                                 │
//! │  PaymentSourceRepository                                               │
//! │  ├── insert(exec, source)                                              │
//! │  ├── get(exec, id)                                                     │
//! │  ├── update(exec, source)                                              │
//! │  └── delete(exec, id)                                                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every method takes the executor as an argument, so the same method    │
//! │  runs against the pool for reads and inside a transaction for writes.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`NegotiationRepository`] - Negotiations, versioned updates
//! - [`PaymentSourceRepository`] - Payment sources and their sums
//! - [`InstallmentRepository`] - Append-only installments, listing, statistics
//! - [`ReferenceCounterRepository`] - Atomic per-month reference counters
//! - [`AuditLogRepository`] - Append-only audit log and its queries
//! - [`NegotiationVersionRepository`] - Numbered snapshots of negotiation terms

pub mod audit;
pub mod installment;
pub mod negotiation;
pub mod payment_source;
pub mod reference_counter;
pub mod version;

pub use audit::AuditLogRepository;
pub use installment::InstallmentRepository;
pub use negotiation::NegotiationRepository;
pub use payment_source::PaymentSourceRepository;
pub use reference_counter::ReferenceCounterRepository;
pub use version::NegotiationVersionRepository;

/// Shared fixtures for repository tests.
#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};
    use ledger_core::{
        Installment, InstallmentKind, Negotiation, NegotiationStatus, PaymentMethod,
        PaymentSource, SourceKind, SourceStatus,
    };
    use uuid::Uuid;

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 12, 0, 0).unwrap()
    }

    pub fn negotiation(client: &str, unit: &str, total: i64) -> Negotiation {
        Negotiation {
            id: Uuid::new_v4().to_string(),
            client_id: client.to_string(),
            housing_unit_id: unit.to_string(),
            negotiated_price_cents: total,
            discount_cents: 0,
            total_cents: total,
            total_paid_cents: 0,
            balance_due_cents: total,
            percent_paid_bps: 0,
            notes: None,
            status: NegotiationStatus::Drafting,
            cancellation_reason: None,
            cancelled_at: None,
            financial_closing_at: None,
            activated_at: None,
            completed_at: None,
            created_at: at(1),
            updated_at: at(1),
            version: 1,
        }
    }

    pub fn source(negotiation_id: &str, kind: SourceKind, approved: i64) -> PaymentSource {
        PaymentSource {
            id: Uuid::new_v4().to_string(),
            negotiation_id: negotiation_id.to_string(),
            kind,
            approved_amount_cents: approved,
            received_amount_cents: 0,
            entity: Some("Bank".to_string()),
            reference_number: Some("REF-1".to_string()),
            allows_multiple_disbursements: kind.allows_multiple_disbursements(),
            status: SourceStatus::Pending,
            completed_at: None,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    pub fn installment(source: &PaymentSource, code: &str, amount: i64, day: u32) -> Installment {
        Installment {
            id: Uuid::new_v4().to_string(),
            negotiation_id: source.negotiation_id.clone(),
            source_id: source.id.clone(),
            reference_code: code.to_string(),
            kind: InstallmentKind::Disbursement,
            amount_cents: amount,
            disbursed_on: at(day).date_naive(),
            method: Some(PaymentMethod::BankTransfer),
            notes: None,
            external_reference: None,
            recorded_by: "user-1".to_string(),
            created_at: at(day),
        }
    }
}
