//! Per-request access scope.
//!
//! The identity/session layer resolves the caller and hands this crate
//! finished claims. An [`AccessContext`] is built from those claims once per
//! request, stays immutable for its lifetime, and is never reused across
//! requests — reuse would leak one caller's scope into another's session.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::BranchId;

/// Resolved identity for one request, as supplied by the session resolver.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub actor_id: Uuid,
    pub actor_name: String,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub accessible_branch_ids: Vec<BranchId>,
    pub is_super_admin: bool,
}

/// The caller's authorized scope for the lifetime of one unit of work.
///
/// All predicates are pure and safe to call concurrently from multiple read
/// paths within the same unit of work.
#[derive(Debug, Clone)]
pub struct AccessContext {
    actor_id: Uuid,
    actor_name: String,
    tenant_id: Uuid,
    company_id: Uuid,
    accessible_branch_ids: HashSet<BranchId>,
    is_super_admin: bool,
}

impl AccessContext {
    pub fn from_claims(claims: IdentityClaims) -> Self {
        Self {
            actor_id: claims.actor_id,
            actor_name: claims.actor_name,
            tenant_id: claims.tenant_id,
            company_id: claims.company_id,
            accessible_branch_ids: claims.accessible_branch_ids.into_iter().collect(),
            is_super_admin: claims.is_super_admin,
        }
    }

    pub fn actor_id(&self) -> Uuid {
        self.actor_id
    }

    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn company_id(&self) -> Uuid {
        self.company_id
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin
    }

    /// Super-admins see every branch; everyone else is filtered.
    pub fn should_filter_by_branch(&self) -> bool {
        !self.is_super_admin
    }

    pub fn has_branch_access(&self, branch_id: BranchId) -> bool {
        !self.should_filter_by_branch() || self.accessible_branch_ids.contains(&branch_id)
    }

    pub fn has_tenant_access(&self, tenant_id: Uuid) -> bool {
        self.is_super_admin || tenant_id == self.tenant_id
    }
}
