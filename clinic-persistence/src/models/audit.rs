//! Audit entry model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// What a committed change did to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    SoftDelete,
    Restore,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::Restore => "restore",
        }
    }
}

/// One committed change to one entity, derived from a before/after diff.
///
/// Invariant: an `Update` entry always has non-empty `changed_fields` —
/// no-op saves never produce an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub old_values: Map<String, Value>,
    pub new_values: Map<String, Value>,
    pub changed_fields: BTreeSet<String>,
}
