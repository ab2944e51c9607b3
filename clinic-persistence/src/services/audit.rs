//! Field-level audit diffing and the audit sink contract.
//!
//! The recorder never relies on a store-side change tracker: originals are
//! snapshotted when entities are loaded and diffed against current values at
//! commit time.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_core::error::CoreError;
use serde_json::Value;

use crate::context::AccessContext;
use crate::models::{fields, AuditAction, AuditEntry, Document};
use crate::services::change_set::{ChangeKind, StagedChange};

/// Diffs the staged write set, stamps audit metadata, and materializes the
/// documents to persist. Runs after the isolation guard has passed and
/// before the physical commit.
pub struct AuditRecorder;

impl AuditRecorder {
    /// One entry per entity with net changes. No-op updates are marked
    /// skipped: they produce no entry and never reach the store.
    pub fn record(
        ctx: &AccessContext,
        staged: &mut [StagedChange],
        now: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, CoreError> {
        let mut entries = Vec::new();
        for change in staged.iter_mut() {
            if change.skip {
                continue;
            }
            match change.kind {
                ChangeKind::Add => Self::record_create(ctx, change, now, &mut entries)?,
                ChangeKind::Update => Self::record_update(ctx, change, now, &mut entries)?,
                ChangeKind::Remove => Self::record_delete(ctx, change, now, &mut entries),
            }
        }
        Ok(entries)
    }

    fn record_create(
        ctx: &AccessContext,
        change: &mut StagedChange,
        now: DateTime<Utc>,
        entries: &mut Vec<AuditEntry>,
    ) -> Result<(), CoreError> {
        if let Some(stamp_created) = change.descriptor.shims.stamp_created {
            stamp_created(change.entity.as_mut(), now, ctx.actor_id());
        }
        let document = (change.descriptor.shims.to_document)(change.entity.as_ref())?;

        entries.push(Self::entry(
            ctx,
            change,
            now,
            AuditAction::Create,
            Document::new(),
            document.clone(),
            document.keys().cloned().collect(),
        ));
        change.final_document = Some(document);
        Ok(())
    }

    fn record_update(
        ctx: &AccessContext,
        change: &mut StagedChange,
        now: DateTime<Utc>,
        entries: &mut Vec<AuditEntry>,
    ) -> Result<(), CoreError> {
        let Some(baseline) = change.baseline().cloned() else {
            // The row does not exist yet; the first write creates it.
            return Self::record_create(ctx, change, now, entries);
        };

        let current = (change.descriptor.shims.to_document)(change.entity.as_ref())?;
        let changed = changed_fields(&baseline, &current);
        if changed.is_empty() {
            change.skip = true;
            tracing::debug!(
                entity_type = change.descriptor.entity_type,
                entity_id = %change.entity_id,
                "No-op update dropped"
            );
            return Ok(());
        }

        let action = if change.descriptor.is_soft_deletable() {
            match (deleted_flag(&baseline), deleted_flag(&current)) {
                (false, true) => AuditAction::SoftDelete,
                (true, false) => AuditAction::Restore,
                _ => AuditAction::Update,
            }
        } else {
            AuditAction::Update
        };

        if let Some(stamp_modified) = change.descriptor.shims.stamp_modified {
            stamp_modified(change.entity.as_mut(), now, ctx.actor_id());
        }
        let mut document = (change.descriptor.shims.to_document)(change.entity.as_ref())?;

        // Creation stamps are immutable after the first write: whatever the
        // application put there is silently replaced by the original values.
        if change.descriptor.is_auditable() {
            for field in [fields::CREATED_AT, fields::CREATED_BY] {
                match baseline.get(field) {
                    Some(value) => {
                        document.insert(field.to_string(), value.clone());
                    }
                    None => {
                        document.remove(field);
                    }
                }
            }
        }

        let mut old_values = Document::new();
        let mut new_values = Document::new();
        for field in &changed {
            if let Some(value) = baseline.get(field) {
                old_values.insert(field.clone(), value.clone());
            }
            if let Some(value) = document.get(field) {
                new_values.insert(field.clone(), value.clone());
            }
        }

        entries.push(Self::entry(
            ctx, change, now, action, old_values, new_values, changed,
        ));
        change.final_document = Some(document);
        Ok(())
    }

    fn record_delete(
        ctx: &AccessContext,
        change: &mut StagedChange,
        now: DateTime<Utc>,
        entries: &mut Vec<AuditEntry>,
    ) {
        let Some(baseline) = change.baseline().cloned() else {
            // Hard delete of a row that no longer exists: nothing to do.
            change.skip = true;
            tracing::debug!(
                entity_type = change.descriptor.entity_type,
                entity_id = %change.entity_id,
                "Delete of a missing row dropped"
            );
            return;
        };

        entries.push(Self::entry(
            ctx,
            change,
            now,
            AuditAction::Delete,
            baseline.clone(),
            Document::new(),
            baseline.keys().cloned().collect(),
        ));
    }

    fn entry(
        ctx: &AccessContext,
        change: &StagedChange,
        now: DateTime<Utc>,
        action: AuditAction,
        old_values: Document,
        new_values: Document,
        changed_fields: BTreeSet<String>,
    ) -> AuditEntry {
        AuditEntry {
            entity_type: change.descriptor.entity_type.to_string(),
            entity_id: change.entity_id.clone(),
            actor_id: ctx.actor_id(),
            actor_name: ctx.actor_name().to_string(),
            timestamp: now,
            action,
            old_values,
            new_values,
            changed_fields,
        }
    }
}

/// Fields that genuinely differ between two snapshots, engine-managed stamp
/// fields excluded. Soft-delete fields are deliberately kept: the tombstone
/// flip is the change being audited.
fn changed_fields(baseline: &Document, current: &Document) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for key in baseline.keys().chain(current.keys()) {
        if fields::ENGINE_MANAGED.contains(&key.as_str()) {
            continue;
        }
        if baseline.get(key) != current.get(key) {
            changed.insert(key.clone());
        }
    }
    changed
}

fn deleted_flag(document: &Document) -> bool {
    matches!(document.get(fields::IS_DELETED), Some(Value::Bool(true)))
}

/// Receives the entries of one successful commit.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn publish(&self, entries: &[AuditEntry]) -> Result<(), CoreError>;
}

/// Writes each entry to the `audit` log target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn publish(&self, entries: &[AuditEntry]) -> Result<(), CoreError> {
        for entry in entries {
            tracing::info!(
                target: "audit",
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                actor_id = %entry.actor_id,
                actor_name = %entry.actor_name,
                action = entry.action.as_str(),
                changed_fields = entry.changed_fields.len(),
                "Audit entry"
            );
        }
        Ok(())
    }
}

/// Collects entries in memory. Meant for tests and local inspection.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit sink lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("audit sink lock poisoned").clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn publish(&self, entries: &[AuditEntry]) -> Result<(), CoreError> {
        self.entries
            .lock()
            .expect("audit sink lock poisoned")
            .extend_from_slice(entries);
        Ok(())
    }
}
