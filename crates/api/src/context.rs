use academia_auth::{AccessClaims, Principal, TenantScope};

/// Authenticated request context.
///
/// Built by the bearer middleware from verified claims and immutable for the
/// rest of the request. The [`TenantScope`] it carries is the only tenant
/// binding downstream handlers may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    scope: TenantScope,
    principal: Principal,
    claims: AccessClaims,
}

impl AuthContext {
    pub fn from_claims(claims: AccessClaims) -> Self {
        Self {
            scope: TenantScope::bind(claims.tenant_id),
            principal: Principal::from_claims(&claims),
            claims,
        }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn claims(&self) -> &AccessClaims {
        &self.claims
    }
}
