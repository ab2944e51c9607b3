//! Capability registry.
//!
//! Entity capabilities are declared once at startup. Registration
//! monomorphizes the trait accessors into type-erased shims and composes the
//! per-type scope predicate a single time, so no query or commit path ever
//! inspects types at runtime. The finished registry is shared via `Arc` and
//! injected into each unit of work — there is no process-wide mutable state.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use clinic_core::error::CoreError;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::context::AccessContext;
use crate::models::{
    Auditable, BranchId, BranchScoped, Document, Persisted, SoftDeletable, TenantScoped, Versioned,
};

/// Type-erased entity reference the registered shims operate on.
pub type AnyEntity = dyn Any + Send + Sync;

/// Monomorphized accessors for one entity type. `None` means the capability
/// was not declared.
pub(crate) struct EntityShims {
    pub clone_boxed: fn(&AnyEntity) -> Box<AnyEntity>,
    pub entity_id: fn(&AnyEntity) -> String,
    pub to_document: fn(&AnyEntity) -> Result<Document, CoreError>,
    pub branch_id: Option<fn(&AnyEntity) -> Option<BranchId>>,
    pub tenant_id: Option<fn(&AnyEntity) -> Option<Uuid>>,
    pub is_deleted: Option<fn(&AnyEntity) -> bool>,
    pub mark_deleted: Option<fn(&mut AnyEntity, DateTime<Utc>, Uuid)>,
    pub stamp_created: Option<fn(&mut AnyEntity, DateTime<Utc>, Uuid)>,
    pub stamp_modified: Option<fn(&mut AnyEntity, DateTime<Utc>, Uuid)>,
    pub row_version: Option<fn(&AnyEntity) -> Option<Uuid>>,
    pub set_row_version: Option<fn(&mut AnyEntity, Uuid)>,
    pub validate: Option<fn(&AnyEntity) -> Result<(), validator::ValidationErrors>>,
}

pub(crate) type ScopeFn = Arc<dyn Fn(&AccessContext, &AnyEntity) -> bool + Send + Sync>;

/// Resolved capabilities of one registered entity type. Built once at
/// registration, immutable afterwards.
pub struct EntityDescriptor {
    pub entity_type: &'static str,
    pub(crate) shims: EntityShims,
    scope: ScopeFn,
}

impl EntityDescriptor {
    pub fn is_branch_scoped(&self) -> bool {
        self.shims.branch_id.is_some()
    }

    pub fn is_tenant_scoped(&self) -> bool {
        self.shims.tenant_id.is_some()
    }

    pub fn is_soft_deletable(&self) -> bool {
        self.shims.mark_deleted.is_some()
    }

    pub fn is_auditable(&self) -> bool {
        self.shims.stamp_created.is_some()
    }

    pub fn is_versioned(&self) -> bool {
        self.shims.row_version.is_some()
    }

    /// Scope predicate applied transparently to every non-privileged read.
    pub(crate) fn in_scope(&self, ctx: &AccessContext, entity: &AnyEntity) -> bool {
        (self.scope)(ctx, entity)
    }
}

/// Registry of every entity type the engine may persist. Lookups by a type
/// that was never registered yield a typed error, not a panic.
pub struct CapabilityRegistry {
    descriptors: HashMap<TypeId, Arc<EntityDescriptor>>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder {
            descriptors: HashMap::new(),
        }
    }

    pub fn descriptor_of<T: Persisted>(&self) -> Result<Arc<EntityDescriptor>, CoreError> {
        self.descriptors
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(CoreError::UnregisteredEntity(T::ENTITY_TYPE))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

pub struct CapabilityRegistryBuilder {
    descriptors: HashMap<TypeId, Arc<EntityDescriptor>>,
}

impl CapabilityRegistryBuilder {
    /// Start declaring capabilities for `T`. Finish the declaration with
    /// [`EntityRegistration::register`].
    pub fn entity<T: Persisted>(&mut self) -> EntityRegistration<'_, T> {
        EntityRegistration {
            builder: self,
            shims: EntityShims {
                clone_boxed: clone_shim::<T>,
                entity_id: entity_id_shim::<T>,
                to_document: to_document_shim::<T>,
                branch_id: None,
                tenant_id: None,
                is_deleted: None,
                mark_deleted: None,
                stamp_created: None,
                stamp_modified: None,
                row_version: None,
                set_row_version: None,
                validate: None,
            },
            _marker: PhantomData,
        }
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            descriptors: self.descriptors,
        }
    }
}

/// In-flight capability declaration for one entity type. Each capability
/// method is bounded by the matching trait, so declaring a capability the
/// type does not implement fails to compile.
pub struct EntityRegistration<'a, T: Persisted> {
    builder: &'a mut CapabilityRegistryBuilder,
    shims: EntityShims,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Persisted> EntityRegistration<'a, T> {
    pub fn branch_scoped(mut self) -> Self
    where
        T: BranchScoped,
    {
        self.shims.branch_id = Some(branch_id_shim::<T>);
        self
    }

    pub fn tenant_scoped(mut self) -> Self
    where
        T: TenantScoped,
    {
        self.shims.tenant_id = Some(tenant_id_shim::<T>);
        self
    }

    pub fn soft_deletable(mut self) -> Self
    where
        T: SoftDeletable,
    {
        self.shims.is_deleted = Some(is_deleted_shim::<T>);
        self.shims.mark_deleted = Some(mark_deleted_shim::<T>);
        self
    }

    pub fn auditable(mut self) -> Self
    where
        T: Auditable,
    {
        self.shims.stamp_created = Some(stamp_created_shim::<T>);
        self.shims.stamp_modified = Some(stamp_modified_shim::<T>);
        self
    }

    pub fn versioned(mut self) -> Self
    where
        T: Versioned,
    {
        self.shims.row_version = Some(row_version_shim::<T>);
        self.shims.set_row_version = Some(set_row_version_shim::<T>);
        self
    }

    pub fn validated(mut self) -> Self
    where
        T: Validate,
    {
        self.shims.validate = Some(validate_shim::<T>);
        self
    }

    /// Commit the declaration into the registry.
    pub fn register(self) {
        let scope = compose_scope(&self.shims);
        self.builder.descriptors.insert(
            TypeId::of::<T>(),
            Arc::new(EntityDescriptor {
                entity_type: T::ENTITY_TYPE,
                shims: self.shims,
                scope,
            }),
        );
    }
}

/// Compose the read-scope predicate for one entity type:
/// branch visibility AND tenant visibility AND not soft-deleted, each term
/// present only when the matching capability was declared. A missing scope
/// value under a filtered context fails closed.
fn compose_scope(shims: &EntityShims) -> ScopeFn {
    let branch_id = shims.branch_id;
    let tenant_id = shims.tenant_id;
    let is_deleted = shims.is_deleted;

    Arc::new(move |ctx, entity| {
        if let Some(branch_id) = branch_id {
            let visible = !ctx.should_filter_by_branch()
                || branch_id(entity).is_some_and(|b| ctx.has_branch_access(b));
            if !visible {
                return false;
            }
        }
        if let Some(tenant_id) = tenant_id {
            let visible = ctx.is_super_admin()
                || tenant_id(entity).is_some_and(|t| ctx.has_tenant_access(t));
            if !visible {
                return false;
            }
        }
        if let Some(is_deleted) = is_deleted {
            if is_deleted(entity) {
                return false;
            }
        }
        true
    })
}

fn downcast<T: Persisted>(entity: &AnyEntity) -> &T {
    entity
        .downcast_ref::<T>()
        .expect("entity does not match its descriptor type")
}

fn downcast_mut<T: Persisted>(entity: &mut AnyEntity) -> &mut T {
    entity
        .downcast_mut::<T>()
        .expect("entity does not match its descriptor type")
}

fn clone_shim<T: Persisted>(entity: &AnyEntity) -> Box<AnyEntity> {
    Box::new(downcast::<T>(entity).clone())
}

fn entity_id_shim<T: Persisted>(entity: &AnyEntity) -> String {
    downcast::<T>(entity).entity_id()
}

fn to_document_shim<T: Persisted>(entity: &AnyEntity) -> Result<Document, CoreError> {
    match serde_json::to_value(downcast::<T>(entity))? {
        Value::Object(map) => Ok(map),
        _ => Err(CoreError::InternalError(anyhow!(
            "{} does not serialize to an object",
            T::ENTITY_TYPE
        ))),
    }
}

fn branch_id_shim<T: BranchScoped>(entity: &AnyEntity) -> Option<BranchId> {
    downcast::<T>(entity).branch_id()
}

fn tenant_id_shim<T: TenantScoped>(entity: &AnyEntity) -> Option<Uuid> {
    downcast::<T>(entity).tenant_id()
}

fn is_deleted_shim<T: SoftDeletable>(entity: &AnyEntity) -> bool {
    downcast::<T>(entity).is_deleted()
}

fn mark_deleted_shim<T: SoftDeletable>(entity: &mut AnyEntity, at: DateTime<Utc>, by: Uuid) {
    downcast_mut::<T>(entity).mark_deleted(at, by)
}

fn stamp_created_shim<T: Auditable>(entity: &mut AnyEntity, at: DateTime<Utc>, by: Uuid) {
    downcast_mut::<T>(entity).set_created(at, by)
}

fn stamp_modified_shim<T: Auditable>(entity: &mut AnyEntity, at: DateTime<Utc>, by: Uuid) {
    downcast_mut::<T>(entity).set_modified(at, by)
}

fn row_version_shim<T: Versioned>(entity: &AnyEntity) -> Option<Uuid> {
    downcast::<T>(entity).row_version()
}

fn set_row_version_shim<T: Versioned>(entity: &mut AnyEntity, version: Uuid) {
    downcast_mut::<T>(entity).set_row_version(version)
}

fn validate_shim<T: Persisted + Validate>(
    entity: &AnyEntity,
) -> Result<(), validator::ValidationErrors> {
    downcast::<T>(entity).validate()
}
