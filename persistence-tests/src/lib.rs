//! Workflow test library.
//!
//! Provides the clinic domain entities and shared infrastructure used by the
//! end-to-end scenarios under `tests/`. The entities exercise every
//! capability combination the engine supports; they exist only for testing —
//! the engine itself carries no business entities.

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

pub const CLINIC_TENANT: Uuid = Uuid::from_u128(0xaaaaaaaa_aaaa_aaaa_aaaa_aaaaaaaaaaaa);
pub const CLINIC_COMPANY: Uuid = Uuid::from_u128(0xbbbbbbbb_bbbb_bbbb_bbbb_bbbbbbbbbbbb);

/// Patient chart: branch- and tenant-scoped, auditable, soft-deletable.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Patient {
    pub id: String,
    pub tenant_id: Option<Uuid>,
    pub branch_id: Option<BranchId>,
    #[validate(length(min = 1))]
    pub full_name: String,
    pub phone: String,
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
            tenant_id: Some(CLINIC_TENANT),
            branch_id: Some(branch_id),
            full_name: full_name.to_string(),
            phone: String::new(),
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

/// Patient invoice: branch-scoped, auditable, version-stamped so concurrent
/// payment postings cannot silently overwrite each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub branch_id: Option<BranchId>,
    pub patient_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub row_version: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<Uuid>,
}

impl Invoice {
    pub fn new(id: &str, branch_id: BranchId, patient_id: &str, amount_cents: i64) -> Self {
        Self {
            id: id.to_string(),
            branch_id: Some(branch_id),
            patient_id: patient_id.to_string(),
            amount_cents,
            status: "open".to_string(),
            row_version: None,
            created_at: None,
            created_by: None,
            modified_at: None,
            modified_by: None,
        }
    }
}

impl Persisted for Invoice {
    const ENTITY_TYPE: &'static str = "invoices";

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl BranchScoped for Invoice {
    fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }
}

impl Auditable for Invoice {
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

impl Versioned for Invoice {
    fn row_version(&self) -> Option<Uuid> {
        self.row_version
    }

    fn set_row_version(&mut self, version: Uuid) {
        self.row_version = Some(version);
    }
}

/// Build the registry every scenario shares.
pub fn clinic_registry() -> Arc<CapabilityRegistry> {
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
        .entity::<Invoice>()
        .branch_scoped()
        .auditable()
        .versioned()
        .register();
    Arc::new(builder.build())
}

/// One clinic backend: registry, store, and audit sink shared by every unit
/// of work a scenario opens.
pub struct ClinicBed {
    pub registry: Arc<CapabilityRegistry>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<MemoryAuditSink>,
}

impl ClinicBed {
    pub fn new() -> Self {
        Self {
            registry: clinic_registry(),
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(MemoryAuditSink::new()),
        }
    }

    /// A fresh unit of work for the given staff member, as the identity
    /// resolver would hand it out per request.
    pub fn session(&self, staff: &Staff) -> UnitOfWork {
        UnitOfWork::new(
            AccessContext::from_claims(staff.claims()),
            Arc::clone(&self.registry),
            self.store.clone(),
            self.sink.clone(),
        )
    }
}

impl Default for ClinicBed {
    fn default() -> Self {
        Self::new()
    }
}

/// A staff member whose sessions the scenarios replay.
pub struct Staff {
    pub actor_id: Uuid,
    pub name: &'static str,
    pub branches: Vec<BranchId>,
    pub is_super_admin: bool,
}

impl Staff {
    pub fn receptionist(branch: BranchId) -> Self {
        Self {
            actor_id: Uuid::new_v4(),
            name: "Meera Pillai",
            branches: vec![branch],
            is_super_admin: false,
        }
    }

    pub fn billing_clerk(branch: BranchId) -> Self {
        Self {
            actor_id: Uuid::new_v4(),
            name: "Joseph George",
            branches: vec![branch],
            is_super_admin: false,
        }
    }

    pub fn administrator() -> Self {
        Self {
            actor_id: Uuid::new_v4(),
            name: "Sunita Menon",
            branches: Vec::new(),
            is_super_admin: true,
        }
    }

    fn claims(&self) -> IdentityClaims {
        IdentityClaims {
            actor_id: self.actor_id,
            actor_name: self.name.to_string(),
            tenant_id: CLINIC_TENANT,
            company_id: CLINIC_COMPANY,
            accessible_branch_ids: self.branches.clone(),
            is_super_admin: self.is_super_admin,
        }
    }
}
