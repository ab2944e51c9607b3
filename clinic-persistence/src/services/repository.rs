//! Typed repository facade over a unit of work.
//!
//! Every read applies the entity type's scope predicate before anything is
//! returned; a row outside the caller's scope is indistinguishable from a
//! missing one. Writes only queue — the store is untouched until
//! [`UnitOfWork::commit`](crate::services::UnitOfWork::commit).

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use clinic_core::error::CoreError;
use serde_json::Value;
use tracing::instrument;

use crate::models::{Document, PageRequest, PagedResult, Persisted};
use crate::registry::EntityDescriptor;
use crate::services::change_set::{ChangeKind, PendingChange};
use crate::services::metrics::PRIVILEGED_READS_TOTAL;
use crate::services::unit_of_work::UnitOfWork;

pub struct Repository<'a, T: Persisted> {
    uow: &'a UnitOfWork,
    descriptor: Arc<EntityDescriptor>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Persisted> Repository<'a, T> {
    pub(crate) fn new(uow: &'a UnitOfWork, descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            uow,
            descriptor,
            _marker: PhantomData,
        }
    }

    fn decode(document: &Document) -> Result<T, CoreError> {
        Ok(serde_json::from_value(Value::Object(document.clone()))?)
    }

    fn in_scope(&self, entity: &T) -> bool {
        self.descriptor.in_scope(self.uow.context(), entity)
    }

    // =========================================================================
    // Scoped reads
    // =========================================================================

    /// Scoped, tracked point read.
    #[instrument(skip(self), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<T>, CoreError> {
        self.fetch_by_id(id, true).await
    }

    /// Scoped, untracked point read — no diffing overhead at commit.
    #[instrument(skip(self), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn get_by_id_read_only(&self, id: &str) -> Result<Option<T>, CoreError> {
        self.fetch_by_id(id, false).await
    }

    async fn fetch_by_id(&self, id: &str, track: bool) -> Result<Option<T>, CoreError> {
        self.uow.ensure_active()?;
        let Some(document) = self.uow.store.get(T::ENTITY_TYPE, id).await? else {
            return Ok(None);
        };
        let entity = Self::decode(&document)?;
        if !self.in_scope(&entity) {
            // Deliberately indistinguishable from a missing row.
            return Ok(None);
        }
        if track {
            self.uow.track(T::ENTITY_TYPE, id, document);
        }
        Ok(Some(entity))
    }

    /// Like [`Repository::get_by_id`], but absent and out-of-scope ids both
    /// become the same `NotFound` error.
    pub async fn require_by_id(&self, id: &str) -> Result<T, CoreError> {
        self.get_by_id(id).await?.ok_or_else(|| {
            CoreError::NotFound(anyhow::anyhow!("{}/{} not found", T::ENTITY_TYPE, id))
        })
    }

    /// Scoped scan with a caller-supplied filter; results are tracked.
    #[instrument(skip(self, filter), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn find<F>(&self, filter: F) -> Result<Vec<T>, CoreError>
    where
        F: Fn(&T) -> bool,
    {
        self.uow.ensure_active()?;
        let mut matches = Vec::new();
        for document in self.uow.store.scan(T::ENTITY_TYPE).await? {
            let entity = Self::decode(&document)?;
            if self.in_scope(&entity) && filter(&entity) {
                self.uow.track(T::ENTITY_TYPE, &entity.entity_id(), document);
                matches.push(entity);
            }
        }
        Ok(matches)
    }

    pub async fn get_all(&self) -> Result<Vec<T>, CoreError> {
        self.find(|_| true).await
    }

    /// Scoped paged query. Page bounds are clamped; a zero filtered count
    /// short-circuits to an empty page; default order is primary key
    /// ascending.
    pub async fn get_paged(&self, page: PageRequest) -> Result<PagedResult<T>, CoreError> {
        self.get_paged_filtered(page, |_| true).await
    }

    #[instrument(skip(self, page, filter), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn get_paged_filtered<F>(
        &self,
        page: PageRequest,
        filter: F,
    ) -> Result<PagedResult<T>, CoreError>
    where
        F: Fn(&T) -> bool,
    {
        self.uow.ensure_active()?;
        let (page_number, page_size) = page.clamped(&self.uow.paging);

        let mut matches: Vec<(T, Document)> = Vec::new();
        for document in self.uow.store.scan(T::ENTITY_TYPE).await? {
            let entity = Self::decode(&document)?;
            if self.in_scope(&entity) && filter(&entity) {
                matches.push((entity, document));
            }
        }

        let total_count = matches.len() as u64;
        if total_count == 0 {
            return Ok(PagedResult::empty(page_number, page_size));
        }

        match &page.order_by {
            Some(field) => matches.sort_by(|a, b| {
                let ordering = compare_values(a.1.get(field), b.1.get(field));
                if page.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            }),
            None => matches.sort_by(|a, b| a.0.entity_id().cmp(&b.0.entity_id())),
        }

        let offset = (page_number as usize - 1) * page_size as usize;
        let items: Vec<T> = matches
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .map(|(entity, document)| {
                self.uow.track(T::ENTITY_TYPE, &entity.entity_id(), document);
                entity
            })
            .collect();

        Ok(PagedResult {
            items,
            total_count,
            page_number,
            page_size,
        })
    }

    // =========================================================================
    // Privileged reads — scope bypass, always logged
    // =========================================================================

    /// Unscoped point read including soft-deleted rows.
    pub async fn get_by_id_privileged(&self, id: &str) -> Result<Option<T>, CoreError> {
        self.log_privileged("get_by_id");
        self.uow.ensure_active()?;
        let Some(document) = self.uow.store.get(T::ENTITY_TYPE, id).await? else {
            return Ok(None);
        };
        let entity = Self::decode(&document)?;
        self.uow.track(T::ENTITY_TYPE, id, document);
        Ok(Some(entity))
    }

    /// Unscoped scan including soft-deleted rows.
    pub async fn find_privileged<F>(&self, filter: F) -> Result<Vec<T>, CoreError>
    where
        F: Fn(&T) -> bool,
    {
        self.log_privileged("find");
        self.uow.ensure_active()?;
        let mut matches = Vec::new();
        for document in self.uow.store.scan(T::ENTITY_TYPE).await? {
            let entity = Self::decode(&document)?;
            if filter(&entity) {
                self.uow.track(T::ENTITY_TYPE, &entity.entity_id(), document);
                matches.push(entity);
            }
        }
        Ok(matches)
    }

    pub async fn get_all_privileged(&self) -> Result<Vec<T>, CoreError> {
        self.find_privileged(|_| true).await
    }

    fn log_privileged(&self, operation: &str) {
        PRIVILEGED_READS_TOTAL
            .with_label_values(&[T::ENTITY_TYPE])
            .inc();
        tracing::warn!(
            actor_id = %self.uow.context().actor_id(),
            entity_type = T::ENTITY_TYPE,
            operation,
            "Privileged read bypassing scope filter"
        );
    }

    // =========================================================================
    // Writes — queued until commit
    // =========================================================================

    /// Queue an insert.
    pub fn add(&self, entity: T) {
        self.enqueue(ChangeKind::Add, entity);
    }

    /// Queue an update.
    pub fn update(&self, entity: T) {
        self.enqueue(ChangeKind::Update, entity);
    }

    /// Queue a delete. Soft-deletable entities are tombstoned at commit
    /// instead of physically removed.
    pub fn remove(&self, entity: T) {
        self.enqueue(ChangeKind::Remove, entity);
    }

    fn enqueue(&self, kind: ChangeKind, entity: T) {
        let entity_id = entity.entity_id();
        self.uow.enqueue(PendingChange {
            kind,
            entity: Box::new(entity),
            descriptor: Arc::clone(&self.descriptor),
            entity_id,
        });
    }
}

/// Total order over optional JSON values for field ordering:
/// null < bool < number < string < everything else (by rendered text).
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| {
            let left = a.map(Value::to_string).unwrap_or_default();
            let right = b.map(Value::to_string).unwrap_or_default();
            left.cmp(&right)
        }),
    }
}
