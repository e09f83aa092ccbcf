//! Authorization guard: role hierarchy and resource ownership checks.
//!
//! - No IO
//! - No panics
//! - Runs only after identity is established

use serde::Serialize;

use academia_core::{BranchId, TenantId, UserId};

use crate::error::AuthError;
use crate::principal::Principal;
use crate::Role;

/// Fails with `InsufficientPermissions` when the principal ranks below `min`.
pub fn require_role(principal: &Principal, min: Role) -> Result<(), AuthError> {
    if principal.role.satisfies(min) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}

/// A resource without a tenant id is "not applicable" and passes.
pub fn require_same_tenant(principal: &Principal, resource_tenant: Option<TenantId>) -> Result<(), AuthError> {
    match resource_tenant {
        Some(tenant_id) if tenant_id != principal.tenant_id => Err(AuthError::TenantMismatch),
        _ => Ok(()),
    }
}

/// System managers see every branch. Everyone else must match their own
/// branch. A resource without a branch id passes.
pub fn require_same_branch(principal: &Principal, resource_branch: Option<BranchId>) -> Result<(), AuthError> {
    let Some(resource_branch) = resource_branch else {
        return Ok(());
    };
    match principal.role {
        Role::SystemManager => Ok(()),
        Role::BranchManager | Role::Coach | Role::Student => {
            if principal.branch_id == Some(resource_branch) {
                Ok(())
            } else {
                Err(AuthError::InsufficientPermissions)
            }
        }
    }
}

/// Managers bypass. Coaches are allowed here; callers compose the branch
/// check. Students may only touch their own record.
pub fn require_self_or_elevated(principal: &Principal, resource_user: UserId) -> Result<(), AuthError> {
    match principal.role {
        Role::SystemManager | Role::BranchManager | Role::Coach => Ok(()),
        Role::Student if principal.user_id == resource_user => Ok(()),
        Role::Student => Err(AuthError::InsufficientPermissions),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a role check was granted or denied. Meant for logs and audit output.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_role: Role,
    pub granted: bool,
    pub reason: String,
    pub principal: Principal,
    /// Roles that would have been sufficient, lowest first.
    pub sufficient_roles: Vec<Role>,
}

pub fn explain(principal: &Principal, min: Role) -> AuthorizationExplanation {
    let granted = principal.role.satisfies(min);
    let reason = if granted {
        format!(
            "role '{}' (rank {}) meets required role '{}' (rank {})",
            principal.role,
            principal.role.rank(),
            min,
            min.rank()
        )
    } else {
        format!(
            "role '{}' (rank {}) is below required role '{}' (rank {})",
            principal.role,
            principal.role.rank(),
            min,
            min.rank()
        )
    };

    AuthorizationExplanation {
        required_role: min,
        granted,
        reason,
        principal: principal.clone(),
        sufficient_roles: Role::ALL.into_iter().filter(|r| r.satisfies(min)).collect(),
    }
}
