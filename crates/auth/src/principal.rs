use serde::Serialize;

use academia_core::{BranchId, TenantId, UserId};

use crate::claims::AccessClaims;
use crate::user::User;
use crate::Role;

/// An authenticated identity, resolved for authorization decisions.
///
/// Built from verified access-token claims on the request path, or from a
/// freshly loaded user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
    pub branch_id: Option<BranchId>,
}

impl Principal {
    pub fn from_claims(claims: &AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            role: claims.role,
            branch_id: claims.branch_id,
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role: user.role,
            branch_id: user.branch_id,
        }
    }
}
