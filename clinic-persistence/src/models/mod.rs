//! Data model for the persistence engine.

pub mod audit;
pub mod capability;
pub mod page;

pub use audit::{AuditAction, AuditEntry};
pub use capability::{
    fields, Auditable, BranchId, BranchScoped, Persisted, SoftDeletable, TenantScoped, Versioned,
};
pub use page::{PageRequest, PagedResult};

/// JSON document representation of a persisted entity. Snapshots taken at
/// load time and diffed at commit time use this shape.
pub type Document = serde_json::Map<String, serde_json::Value>;
