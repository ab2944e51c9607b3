//! Pending write-set representation shared by the commit pipeline stages.

use std::sync::Arc;

use crate::models::Document;
use crate::registry::{AnyEntity, EntityDescriptor};
use crate::services::store::VersionGuard;

/// What the caller asked for. `Remove` may be rewritten to `Update` by the
/// soft-delete converter before the guard and recorder ever see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

/// One enqueued write, exactly as the caller handed it over.
pub(crate) struct PendingChange {
    pub kind: ChangeKind,
    pub entity: Box<AnyEntity>,
    pub descriptor: Arc<EntityDescriptor>,
    pub entity_id: String,
}

impl PendingChange {
    /// Clone into a staged change the pipeline may mutate freely. The
    /// pending queue itself stays untouched so a failed commit leaves it in
    /// its pre-commit state.
    pub fn stage(&self) -> StagedChange {
        StagedChange {
            kind: self.kind,
            entity: (self.descriptor.shims.clone_boxed)(self.entity.as_ref()),
            descriptor: Arc::clone(&self.descriptor),
            entity_id: self.entity_id.clone(),
            tracked_original: None,
            stored_current: None,
            converted_from_remove: false,
            version_guard: VersionGuard::None,
            final_document: None,
            skip: false,
        }
    }
}

/// A pending change staged for one commit attempt. The pipeline stages fill
/// in originals, stamps, the version guard, and the final document.
pub struct StagedChange {
    pub kind: ChangeKind,
    pub entity: Box<AnyEntity>,
    pub descriptor: Arc<EntityDescriptor>,
    pub entity_id: String,
    /// Original document snapshotted when the entity was loaded through this
    /// unit of work, if it was.
    pub tracked_original: Option<Document>,
    /// Current stored document fetched at commit time for entities that
    /// entered the write set without a tracked read.
    pub stored_current: Option<Document>,
    pub converted_from_remove: bool,
    pub version_guard: VersionGuard,
    /// Document to persist; `None` until the recorder materializes it, and
    /// left `None` for skipped no-op changes.
    pub final_document: Option<Document>,
    /// Set when the change turned out to be a no-op (or targets a row that
    /// no longer exists) and must not reach the store.
    pub skip: bool,
}

impl StagedChange {
    /// Diff baseline: the tracked original when the entity was loaded through
    /// this unit of work, otherwise whatever the store currently holds.
    pub fn baseline(&self) -> Option<&Document> {
        self.tracked_original
            .as_ref()
            .or(self.stored_current.as_ref())
    }
}
