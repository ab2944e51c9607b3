//! clinic-persistence: Multi-tenant data-access isolation and audit engine.
//!
//! Every read issued through a [`services::Repository`] is scoped to the
//! caller's accessible branches and tenant; every write is re-validated at
//! commit time, deletes of soft-deletable entities become tombstone updates,
//! and each committed change produces a field-level audit entry.
pub mod context;
pub mod models;
pub mod registry;
pub mod services;

pub use context::{AccessContext, IdentityClaims};
pub use registry::CapabilityRegistry;
