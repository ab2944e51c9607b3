//! Unit of work: the single entry point for scoped reads and queued writes.
//!
//! One unit of work per logical request, bound to one [`AccessContext`].
//! Never share an instance across requests or concurrent callers — the
//! backing state is single-writer and identity must be re-resolved per
//! request. Writes queue in memory and only [`UnitOfWork::commit`] touches
//! the store, as one atomic unit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use clinic_core::config::PagingConfig;
use clinic_core::error::CoreError;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::context::AccessContext;
use crate::models::{fields, Document, Persisted};
use crate::registry::CapabilityRegistry;
use crate::services::audit::{AuditRecorder, AuditSink};
use crate::services::change_set::{ChangeKind, PendingChange, StagedChange};
use crate::services::guard::PersistenceGuard;
use crate::services::metrics::{AUDIT_ENTRIES_TOTAL, COMMITS_TOTAL, OPERATION_DURATION};
use crate::services::repository::Repository;
use crate::services::soft_delete::SoftDeleteConverter;
use crate::services::store::{DocumentStore, VersionGuard, WriteOp};

pub struct UnitOfWork {
    pub(crate) ctx: AccessContext,
    registry: Arc<CapabilityRegistry>,
    pub(crate) store: Arc<dyn DocumentStore>,
    sink: Arc<dyn AuditSink>,
    pub(crate) paging: PagingConfig,
    cancel: CancellationToken,
    pending: Mutex<Vec<PendingChange>>,
    /// Original documents snapshotted by tracked reads, keyed by
    /// (entity type, entity id). The diff baseline at commit time.
    tracked: Mutex<HashMap<(&'static str, String), Document>>,
}

impl UnitOfWork {
    pub fn new(
        ctx: AccessContext,
        registry: Arc<CapabilityRegistry>,
        store: Arc<dyn DocumentStore>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            ctx,
            registry,
            store,
            sink,
            paging: PagingConfig::default(),
            cancel: CancellationToken::new(),
            pending: Mutex::new(Vec::new()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_paging(mut self, paging: PagingConfig) -> Self {
        self.paging = paging;
        self
    }

    /// Bind the request's cancellation token. Every async operation checks
    /// it; a commit cancelled before the physical apply has no effect.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn context(&self) -> &AccessContext {
        &self.ctx
    }

    /// Typed repository facade for `T`. Fails if `T` was never registered.
    pub fn repository<T: Persisted>(&self) -> Result<Repository<'_, T>, CoreError> {
        Ok(Repository::new(self, self.registry.descriptor_of::<T>()?))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending queue lock poisoned").len()
    }

    /// Drop every queued write, e.g. after a failed commit the caller does
    /// not want to fix and retry.
    pub fn discard_changes(&self) {
        self.pending.lock().expect("pending queue lock poisoned").clear();
    }

    pub(crate) fn ensure_active(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn track(&self, entity_type: &'static str, entity_id: &str, document: Document) {
        self.tracked
            .lock()
            .expect("tracked map lock poisoned")
            .insert((entity_type, entity_id.to_string()), document);
    }

    pub(crate) fn tracked_original(
        &self,
        entity_type: &'static str,
        entity_id: &str,
    ) -> Option<Document> {
        self.tracked
            .lock()
            .expect("tracked map lock poisoned")
            .get(&(entity_type, entity_id.to_string()))
            .cloned()
    }

    pub(crate) fn enqueue(&self, change: PendingChange) {
        self.pending.lock().expect("pending queue lock poisoned").push(change);
    }

    /// Commit every queued write as one atomic unit and return rows affected.
    ///
    /// The pipeline order is fixed: validation, soft-delete conversion,
    /// original resolution, isolation guard, audit diffing, then a single
    /// atomic store apply. A failure at any stage persists nothing and
    /// leaves the queue in its pre-commit state; the staged clones are
    /// simply discarded.
    #[instrument(skip(self), fields(actor_id = %self.ctx.actor_id(), tenant_id = %self.ctx.tenant_id()))]
    pub async fn commit(&self) -> Result<u64, CoreError> {
        let timer = OPERATION_DURATION.with_label_values(&["commit"]).start_timer();
        let result = self.commit_inner().await;
        timer.observe_duration();

        match &result {
            Ok(affected) => {
                COMMITS_TOTAL.with_label_values(&["ok"]).inc();
                tracing::debug!(rows_affected = affected, "Commit applied");
            }
            Err(err) => {
                COMMITS_TOTAL.with_label_values(&[err.kind()]).inc();
            }
        }
        result
    }

    async fn commit_inner(&self) -> Result<u64, CoreError> {
        self.ensure_active()?;

        let mut staged: Vec<StagedChange> = {
            let pending = self.pending.lock().expect("pending queue lock poisoned");
            pending.iter().map(PendingChange::stage).collect()
        };
        if staged.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();

        // Entity-level validation fails before the guard/audit pipeline runs.
        for change in &staged {
            if let Some(validate) = change.descriptor.shims.validate {
                validate(change.entity.as_ref())?;
            }
        }

        SoftDeleteConverter::convert(&mut staged, &self.ctx, now);

        self.resolve_originals(&mut staged).await?;

        PersistenceGuard::check(&self.ctx, &staged)?;

        self.prepare_versions(&mut staged);

        let entries = AuditRecorder::record(&self.ctx, &mut staged, now)?;

        let batch = Self::assemble_batch(&staged);

        // Last cancellation point; past here the store mutates atomically.
        self.ensure_active()?;

        let affected = if batch.is_empty() {
            0
        } else {
            self.store.apply(batch).await?
        };

        if !entries.is_empty() {
            for entry in &entries {
                AUDIT_ENTRIES_TOTAL
                    .with_label_values(&[entry.action.as_str()])
                    .inc();
            }
            // The commit is already durable; a sink failure is an
            // operational problem, not the caller's.
            if let Err(err) = self.sink.publish(&entries).await {
                tracing::error!(error = %err, "Audit sink rejected committed entries");
            }
        }

        self.finish_commit(&staged);

        Ok(affected)
    }

    /// Fill in the diff baselines. Tracked reads already snapshotted their
    /// originals; entities that entered the write set untracked get the
    /// currently stored document fetched here.
    async fn resolve_originals(&self, staged: &mut [StagedChange]) -> Result<(), CoreError> {
        for change in staged.iter_mut() {
            if change.skip || change.kind == ChangeKind::Add {
                continue;
            }
            change.tracked_original =
                self.tracked_original(change.descriptor.entity_type, &change.entity_id);
            if change.tracked_original.is_none() {
                change.stored_current = self
                    .store
                    .get(change.descriptor.entity_type, &change.entity_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Assemble version guards and mint new row versions.
    ///
    /// The expected version is the one seen when the entity was loaded
    /// through this unit of work; for entities constructed outside a tracked
    /// read, whatever version the entity itself carries. A commit-time fetch
    /// is never used as the expectation — that would make the check vacuous.
    fn prepare_versions(&self, staged: &mut [StagedChange]) {
        for change in staged.iter_mut() {
            if change.skip {
                continue;
            }
            let Some(row_version) = change.descriptor.shims.row_version else {
                continue;
            };

            let expected = match change.kind {
                ChangeKind::Add => None,
                ChangeKind::Update | ChangeKind::Remove => {
                    if change.tracked_original.is_some() {
                        version_in(change.tracked_original.as_ref())
                    } else {
                        row_version(change.entity.as_ref())
                    }
                }
            };
            change.version_guard = VersionGuard::Expect(expected);

            if change.kind != ChangeKind::Remove {
                if let Some(set_row_version) = change.descriptor.shims.set_row_version {
                    set_row_version(change.entity.as_mut(), Uuid::new_v4());
                }
            }
        }
    }

    fn assemble_batch(staged: &[StagedChange]) -> Vec<WriteOp> {
        let mut batch = Vec::new();
        for change in staged {
            if change.skip {
                continue;
            }
            match change.kind {
                ChangeKind::Add | ChangeKind::Update => {
                    if let Some(document) = &change.final_document {
                        batch.push(WriteOp::Put {
                            entity_type: change.descriptor.entity_type,
                            entity_id: change.entity_id.clone(),
                            document: document.clone(),
                            guard: change.version_guard.clone(),
                        });
                    }
                }
                ChangeKind::Remove => {
                    batch.push(WriteOp::Delete {
                        entity_type: change.descriptor.entity_type,
                        entity_id: change.entity_id.clone(),
                        guard: change.version_guard.clone(),
                    });
                }
            }
        }
        batch
    }

    /// After a successful apply: clear the queue and refresh the tracked
    /// snapshots so a follow-up edit in the same unit of work diffs against
    /// what is now stored.
    fn finish_commit(&self, staged: &[StagedChange]) {
        let mut tracked = self.tracked.lock().expect("tracked map lock poisoned");
        for change in staged {
            if change.skip {
                continue;
            }
            let key = (change.descriptor.entity_type, change.entity_id.clone());
            match change.kind {
                ChangeKind::Remove => {
                    tracked.remove(&key);
                }
                ChangeKind::Add | ChangeKind::Update => {
                    if let Some(document) = &change.final_document {
                        tracked.insert(key, document.clone());
                    }
                }
            }
        }
        drop(tracked);
        self.pending.lock().expect("pending queue lock poisoned").clear();
    }
}

fn version_in(document: Option<&Document>) -> Option<Uuid> {
    document
        .and_then(|doc| doc.get(fields::ROW_VERSION))
        .and_then(|value| value.as_str())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
