//! # Audit Records
//!
//! The append-only trail of every ledger mutation.
//!
//! ## Record Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AuditRecord                                                            │
//! │  ─────────────────────────────────────────────────────────────────────  │
//! │  entity_type / entity_id      what changed                              │
//! │  operation                    create | update | delete                  │
//! │  actor_id / actor_role        who changed it                            │
//! │  before                       null on create                            │
//! │  after                        null on delete                            │
//! │  diff                         only on update: field → {before, after}   │
//! │  metadata                     free-form JSON                            │
//! │  module                       negotiations | payments                   │
//! │  seq                          insertion order (assigned by storage)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots are the serde JSON form of the entity, so the diff compares
//! exactly what a reader of the record sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use ts_rs::TS;

use crate::types::Actor;

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Negotiation,
    PaymentSource,
    Installment,
}

impl EntityType {
    /// Module tag every record for this entity type carries.
    pub const fn module(&self) -> ModuleTag {
        match self {
            EntityType::Negotiation => ModuleTag::Negotiations,
            EntityType::PaymentSource | EntityType::Installment => ModuleTag::Payments,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Negotiation => "negotiation",
            EntityType::PaymentSource => "payment_source",
            EntityType::Installment => "installment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

/// Functional area of the application a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ModuleTag {
    Negotiations,
    Payments,
}

impl ModuleTag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ModuleTag::Negotiations => "negotiations",
            ModuleTag::Payments => "payments",
        }
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Field Diff
// =============================================================================

/// One changed field of an Update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FieldChange {
    #[ts(type = "unknown")]
    pub before: Value,
    #[ts(type = "unknown")]
    pub after: Value,
}

/// Field-level diff between two snapshots.
///
/// Covers the union of top-level keys; a key missing on one side counts as
/// `null` there. Only differing fields are listed. Non-object snapshots are
/// compared as a whole under the key `"value"`.
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use ledger_core::audit::compute_diff;
///
/// let diff = compute_diff(
///     &json!({"approved": 100, "entity": "Bank"}),
///     &json!({"approved": 120, "entity": "Bank"}),
/// );
/// assert_eq!(diff.len(), 1);
/// assert_eq!(diff["approved"].after, json!(120));
/// ```
pub fn compute_diff(before: &Value, after: &Value) -> BTreeMap<String, FieldChange> {
    let mut diff = BTreeMap::new();

    match (before.as_object(), after.as_object()) {
        (Some(b), Some(a)) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            for key in keys {
                let old = b.get(key).unwrap_or(&Value::Null);
                let new = a.get(key).unwrap_or(&Value::Null);
                if old != new {
                    diff.insert(
                        key.clone(),
                        FieldChange {
                            before: old.clone(),
                            after: new.clone(),
                        },
                    );
                }
            }
        }
        _ => {
            if before != after {
                diff.insert(
                    "value".to_string(),
                    FieldChange {
                        before: before.clone(),
                        after: after.clone(),
                    },
                );
            }
        }
    }

    diff
}

/// JSON snapshot of an entity. Falls back to `null` if serialization fails.
pub fn snapshot<T: Serialize>(entity: &T) -> Value {
    serde_json::to_value(entity).unwrap_or(Value::Null)
}

// =============================================================================
// Audit Entry (input)
// =============================================================================

/// A mutation about to be audited, before an id and sequence are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: AuditOperation,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Option<Value>,
}

impl AuditEntry {
    pub fn create<T: Serialize>(entity_type: EntityType, entity_id: &str, after: &T) -> Self {
        AuditEntry {
            entity_type,
            entity_id: entity_id.to_string(),
            operation: AuditOperation::Create,
            before: None,
            after: Some(snapshot(after)),
            metadata: None,
        }
    }

    pub fn update<T: Serialize>(
        entity_type: EntityType,
        entity_id: &str,
        before: &T,
        after: &T,
    ) -> Self {
        AuditEntry {
            entity_type,
            entity_id: entity_id.to_string(),
            operation: AuditOperation::Update,
            before: Some(snapshot(before)),
            after: Some(snapshot(after)),
            metadata: None,
        }
    }

    pub fn delete<T: Serialize>(entity_type: EntityType, entity_id: &str, before: &T) -> Self {
        AuditEntry {
            entity_type,
            entity_id: entity_id.to_string(),
            operation: AuditOperation::Delete,
            before: Some(snapshot(before)),
            after: None,
            metadata: None,
        }
    }

    /// Attaches metadata, e.g. `{"transition": "suspend", "motive": "..."}`.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Stamps the entry into a record.
    ///
    /// The diff is only computed for updates that carry both snapshots.
    /// `seq` is 0 until storage assigns one.
    pub fn into_record(self, id: String, actor: &Actor, recorded_at: DateTime<Utc>) -> AuditRecord {
        let diff = match (self.operation, &self.before, &self.after) {
            (AuditOperation::Update, Some(before), Some(after)) => Some(compute_diff(before, after)),
            _ => None,
        };

        AuditRecord {
            seq: 0,
            id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            operation: self.operation,
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            recorded_at,
            before: self.before,
            after: self.after,
            diff,
            metadata: self.metadata,
            module: self.entity_type.module(),
        }
    }
}

// =============================================================================
// Audit Record
// =============================================================================

/// A persisted, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditRecord {
    /// Insertion sequence, strictly increasing.
    pub seq: i64,
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: AuditOperation,
    pub actor_id: String,
    pub actor_role: String,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
    #[ts(type = "unknown")]
    pub before: Option<Value>,
    #[ts(type = "unknown")]
    pub after: Option<Value>,
    pub diff: Option<BTreeMap<String, FieldChange>>,
    #[ts(type = "unknown")]
    pub metadata: Option<Value>,
    pub module: ModuleTag,
}

/// Per-module activity figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModuleSummary {
    pub module: ModuleTag,
    pub event_count: u32,
    pub distinct_actors: u32,
    pub creates: u32,
    pub updates: u32,
    pub deletes: u32,
    #[ts(as = "Option<String>")]
    pub first_event_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub last_event_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
