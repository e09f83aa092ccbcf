//! Request-scoped tenant binding.
//!
//! A [`TenantScope`] is created once per request, from verified token claims
//! or from the tenant the auth service resolved by domain, and handed to every
//! storage call by reference. It is an ordinary value: it is gone when the
//! request's future completes or unwinds, so there is nothing to clear and no
//! way for a concurrent request to observe it.
//!
//! Storage adapters enforce it twice:
//! - [`TenantScope::admit`] rejects a call whose explicit tenant argument
//!   disagrees with the bound tenant.
//! - [`TenantScope::permits`] is the row policy, applied to each candidate row
//!   independently of the explicit filter.

use academia_core::TenantId;

use crate::repository::StoreError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: TenantId,
}

impl TenantScope {
    pub fn bind(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Application-layer check: the explicit argument must match the binding.
    pub fn admit(&self, explicit: TenantId) -> Result<(), StoreError> {
        if explicit != self.tenant_id {
            tracing::error!(
                bound = %self.tenant_id,
                explicit = %explicit,
                "tenant scope violation"
            );
            return Err(StoreError::ScopeViolation);
        }
        Ok(())
    }

    /// Row policy: is a row owned by `row_tenant` visible in this scope?
    pub fn permits(&self, row_tenant: TenantId) -> bool {
        row_tenant == self.tenant_id
    }
}
