//! Entity capability contracts.
//!
//! Domain entities declare explicitly which capabilities they carry by
//! implementing these traits and registering them in the
//! [`crate::registry::CapabilityRegistry`]. Nothing is ever inferred from
//! field names at runtime.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Branch identifier. Branches are the finest-grained scoping unit; most
/// scoped entities carry one.
pub type BranchId = i32;

/// Field names the engine manages on entity documents. Entities that opt in
/// to a capability must serialize the matching fields under these names so
/// snapshots round-trip through the store.
pub mod fields {
    pub const CREATED_AT: &str = "created_at";
    pub const CREATED_BY: &str = "created_by";
    pub const MODIFIED_AT: &str = "modified_at";
    pub const MODIFIED_BY: &str = "modified_by";
    pub const IS_DELETED: &str = "is_deleted";
    pub const DELETED_AT: &str = "deleted_at";
    pub const DELETED_BY: &str = "deleted_by";
    pub const ROW_VERSION: &str = "row_version";

    /// Engine-managed fields excluded from audit diffs.
    pub const ENGINE_MANAGED: &[&str] = &[CREATED_AT, CREATED_BY, MODIFIED_AT, MODIFIED_BY, ROW_VERSION];
}

/// Base contract for anything the engine persists.
pub trait Persisted: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection/table name; also the `entity_type` on audit entries.
    const ENTITY_TYPE: &'static str;

    /// Primary key rendered as a string; composite keys join their parts.
    fn entity_id(&self) -> String;
}

/// Entities isolated per branch.
pub trait BranchScoped: Persisted {
    /// `None` is treated as inaccessible for filtered callers (fail closed),
    /// never as globally visible.
    fn branch_id(&self) -> Option<BranchId>;
}

/// Entities isolated per tenant, independently of branch scoping.
pub trait TenantScoped: Persisted {
    fn tenant_id(&self) -> Option<Uuid>;
}

/// Entities stamped with creation/modification metadata.
///
/// Creation stamps are written exactly once; the engine silently restores
/// them from the tracked original if application code overwrites them.
pub trait Auditable: Persisted {
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn created_by(&self) -> Option<Uuid>;
    fn set_created(&mut self, at: DateTime<Utc>, by: Uuid);
    fn set_modified(&mut self, at: DateTime<Utc>, by: Uuid);
}

/// Entities whose deletes become tombstone updates.
pub trait SoftDeletable: Persisted {
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self, at: DateTime<Utc>, by: Uuid);
}

/// Entities protected against concurrent overwrites by an opaque row-version
/// token. A commit whose token no longer matches the stored one fails with
/// `ConcurrencyConflict`.
pub trait Versioned: Persisted {
    fn row_version(&self) -> Option<Uuid>;
    fn set_row_version(&mut self, version: Uuid);
}
