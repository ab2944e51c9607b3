//! Soft-delete conversion.

use chrono::{DateTime, Utc};

use crate::context::AccessContext;
use crate::services::change_set::{ChangeKind, StagedChange};

/// Rewrites staged removes of soft-deletable entities into tombstone
/// updates. Runs before the guard and the recorder, so both see an update —
/// never a physical delete — for soft-deletable entities.
pub struct SoftDeleteConverter;

impl SoftDeleteConverter {
    pub fn convert(staged: &mut [StagedChange], ctx: &AccessContext, now: DateTime<Utc>) {
        for change in staged {
            if change.kind != ChangeKind::Remove {
                continue;
            }
            let Some(mark_deleted) = change.descriptor.shims.mark_deleted else {
                // No capability: the hard delete goes through as requested.
                continue;
            };

            let already_deleted = change
                .descriptor
                .shims
                .is_deleted
                .map(|is_deleted| is_deleted(change.entity.as_ref()))
                .unwrap_or(false);
            if already_deleted {
                // Idempotent: deleting a tombstone changes nothing.
                change.skip = true;
                tracing::debug!(
                    entity_type = change.descriptor.entity_type,
                    entity_id = %change.entity_id,
                    "Remove of an already soft-deleted row skipped"
                );
                continue;
            }

            mark_deleted(change.entity.as_mut(), now, ctx.actor_id());
            change.kind = ChangeKind::Update;
            change.converted_from_remove = true;
            tracing::debug!(
                entity_type = change.descriptor.entity_type,
                entity_id = %change.entity_id,
                "Remove converted into soft delete"
            );
        }
    }
}
