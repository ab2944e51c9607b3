//! Test harness for clinic-persistence integration tests.
//!
//! Defines a small set of clinic entities exercising every capability
//! combination, plus a test bed wiring registry, in-memory store, and
//! in-memory audit sink together.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clinic_persistence::models::{
    Auditable, BranchId, BranchScoped, Persisted, SoftDeletable, TenantScoped, Versioned,
};
use clinic_persistence::services::{MemoryAuditSink, MemoryStore, UnitOfWork};
use clinic_persistence::{AccessContext, CapabilityRegistry, IdentityClaims};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const TENANT_A: Uuid = Uuid::from_u128(0x11111111_1111_1111_1111_111111111111);
pub const TENANT_B: Uuid = Uuid::from_u128(0x22222222_2222_2222_2222_222222222222);
pub const COMPANY: Uuid = Uuid::from_u128(0x33333333_3333_3333_3333_333333333333);
pub const ACTOR: Uuid = Uuid::from_u128(0x44444444_4444_4444_4444_444444444444);

/// Patient record: branch- and tenant-scoped, auditable, soft-deletable.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Patient {
    pub id: String,
    pub tenant_id: Option<Uuid>,
    pub branch_id: Option<BranchId>,
    #[validate(length(min = 1))]
    pub full_name: String,
    pub phone: String,
    pub blood_group: String,
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<Uuid>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Patient {
    pub fn new(id: &str, branch_id: BranchId, full_name: &str) -> Self {
        Self {
            id: id.to_string(),
            tenant_id: Some(TENANT_A),
            branch_id: Some(branch_id),
            full_name: full_name.to_string(),
            phone: "000".to_string(),
            blood_group: "O+".to_string(),
            notes: String::new(),
            created_at: None,
            created_by: None,
            modified_at: None,
            modified_by: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        }
    }

    /// Clear the tombstone so the record becomes visible again.
    pub fn restore(&mut self) {
        self.is_deleted = false;
        self.deleted_at = None;
        self.deleted_by = None;
    }
}

impl Persisted for Patient {
    const ENTITY_TYPE: &'static str = "patients";

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl BranchScoped for Patient {
    fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }
}

impl TenantScoped for Patient {
    fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }
}

impl Auditable for Patient {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }

    fn set_created(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.created_at = Some(at);
        self.created_by = Some(by);
    }

    fn set_modified(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.modified_at = Some(at);
        self.modified_by = Some(by);
    }
}

impl SoftDeletable for Patient {
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(by);
    }
}

/// Financial document: branch-scoped, auditable, version-stamped against
/// concurrent payment updates. Not soft-deletable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDoc {
    pub id: String,
    pub branch_id: Option<BranchId>,
    pub amount_cents: i64,
    pub status: String,
    pub row_version: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<Uuid>,
}

impl InvoiceDoc {
    pub fn new(id: &str, branch_id: BranchId, amount_cents: i64) -> Self {
        Self {
            id: id.to_string(),
            branch_id: Some(branch_id),
            amount_cents,
            status: "draft".to_string(),
            row_version: None,
            created_at: None,
            created_by: None,
            modified_at: None,
            modified_by: None,
        }
    }
}

impl Persisted for InvoiceDoc {
    const ENTITY_TYPE: &'static str = "invoices";

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl BranchScoped for InvoiceDoc {
    fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }
}

impl Auditable for InvoiceDoc {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }

    fn set_created(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.created_at = Some(at);
        self.created_by = Some(by);
    }

    fn set_modified(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.modified_at = Some(at);
        self.modified_by = Some(by);
    }
}

impl Versioned for InvoiceDoc {
    fn row_version(&self) -> Option<Uuid> {
        self.row_version
    }

    fn set_row_version(&mut self, version: Uuid) {
        self.row_version = Some(version);
    }
}

/// Inventory line: branch-scoped only. Deletes are physical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItem {
    pub id: String,
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub quantity: i32,
}

impl StockItem {
    pub fn new(id: &str, branch_id: BranchId, name: &str, quantity: i32) -> Self {
        Self {
            id: id.to_string(),
            branch_id: Some(branch_id),
            name: name.to_string(),
            quantity,
        }
    }
}

impl Persisted for StockItem {
    const ENTITY_TYPE: &'static str = "stock_items";

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl BranchScoped for StockItem {
    fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }
}

pub fn registry() -> Arc<CapabilityRegistry> {
    let mut builder = CapabilityRegistry::builder();
    builder
        .entity::<Patient>()
        .branch_scoped()
        .tenant_scoped()
        .auditable()
        .soft_deletable()
        .validated()
        .register();
    builder
        .entity::<InvoiceDoc>()
        .branch_scoped()
        .auditable()
        .versioned()
        .register();
    builder.entity::<StockItem>().branch_scoped().register();
    Arc::new(builder.build())
}

/// Registry + in-memory store + in-memory audit sink, shared by every unit
/// of work a test opens.
pub struct TestBed {
    pub registry: Arc<CapabilityRegistry>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<MemoryAuditSink>,
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            registry: registry(),
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(MemoryAuditSink::new()),
        }
    }

    /// Open a unit of work for a regular caller in `TENANT_A`.
    pub fn uow(&self, branches: &[BranchId]) -> UnitOfWork {
        self.uow_for(claims(branches, false))
    }

    /// Open a unit of work with super-admin scope.
    pub fn admin_uow(&self) -> UnitOfWork {
        self.uow_for(claims(&[], true))
    }

    pub fn uow_for(&self, claims: IdentityClaims) -> UnitOfWork {
        UnitOfWork::new(
            AccessContext::from_claims(claims),
            Arc::clone(&self.registry),
            self.store.clone(),
            self.sink.clone(),
        )
    }
}

pub fn claims(branches: &[BranchId], is_super_admin: bool) -> IdentityClaims {
    IdentityClaims {
        actor_id: ACTOR,
        actor_name: "Dr. Asha Rao".to_string(),
        tenant_id: TENANT_A,
        company_id: COMPANY,
        accessible_branch_ids: branches.to_vec(),
        is_super_admin,
    }
}

pub fn claims_for_tenant(
    tenant_id: Uuid,
    branches: &[BranchId],
    is_super_admin: bool,
) -> IdentityClaims {
    IdentityClaims {
        tenant_id,
        ..claims(branches, is_super_admin)
    }
}
