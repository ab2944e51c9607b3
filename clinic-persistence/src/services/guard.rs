//! Write-time isolation guard.
//!
//! The read-time scope predicate alone is not a sufficient defense: entities
//! can enter the write set without ever passing a scoped read (constructed
//! from an import, deserialized from a request body). The guard re-validates
//! the full staged set immediately before the physical commit and rejects
//! the whole commit on the first violation — partial acceptance could leave
//! state straddling two branches' data.

use clinic_core::error::CoreError;

use crate::context::AccessContext;
use crate::services::change_set::StagedChange;
use crate::services::metrics::ISOLATION_VIOLATIONS_TOTAL;

pub struct PersistenceGuard;

impl PersistenceGuard {
    /// Validate every staged change against the caller's scope.
    /// Super-admin contexts bypass both checks.
    pub fn check(ctx: &AccessContext, staged: &[StagedChange]) -> Result<(), CoreError> {
        if ctx.is_super_admin() {
            return Ok(());
        }

        for change in staged {
            if change.skip {
                continue;
            }
            let shims = &change.descriptor.shims;

            if let Some(branch_id) = shims.branch_id {
                let authorized = branch_id(change.entity.as_ref())
                    .is_some_and(|branch| ctx.has_branch_access(branch));
                if !authorized {
                    return Err(Self::violation(ctx, change));
                }
            }

            if let Some(tenant_id) = shims.tenant_id {
                let authorized = tenant_id(change.entity.as_ref())
                    .is_some_and(|tenant| ctx.has_tenant_access(tenant));
                if !authorized {
                    return Err(Self::violation(ctx, change));
                }
            }
        }

        Ok(())
    }

    /// Log and count the violation. Identifiers only — never field values,
    /// which may belong to another tenant.
    fn violation(ctx: &AccessContext, change: &StagedChange) -> CoreError {
        ISOLATION_VIOLATIONS_TOTAL
            .with_label_values(&[change.descriptor.entity_type])
            .inc();
        tracing::warn!(
            actor_id = %ctx.actor_id(),
            entity_type = change.descriptor.entity_type,
            entity_id = %change.entity_id,
            "Write rejected: outside the caller's authorized scope"
        );
        CoreError::IsolationViolation {
            actor_id: ctx.actor_id(),
            entity_type: change.descriptor.entity_type,
            entity_id: change.entity_id.clone(),
        }
    }
}
