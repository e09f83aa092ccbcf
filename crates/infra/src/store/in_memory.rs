//! In-memory tenant directory and credential store.
//!
//! Intended for tests/dev. Rows are keyed by `(TenantId, UserId)`; every
//! scoped call runs [`TenantScope::admit`] and then filters candidates by the
//! explicit key tenant *and* by [`TenantScope::permits`] on the row's own
//! tenant, so either check alone is enough to hide a foreign row.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use academia_auth::{
    CredentialStore, NewUser, StoreError, Tenant, TenantDirectory, TenantScope, User, UserLocator, UserStatus,
    normalize_domain,
};
use academia_core::{TenantId, UserId};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// In-memory tenant directory.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tenant. The domain is stored normalized.
    pub fn insert(&self, mut tenant: Tenant) -> Result<(), StoreError> {
        tenant.domain = normalize_domain(&tenant.domain);
        let mut map = self.tenants.write().map_err(|_| poisoned())?;
        if map
            .values()
            .any(|t| t.domain == tenant.domain && t.id != tenant.id)
        {
            return Err(StoreError::Conflict);
        }
        map.insert(tenant.id, tenant);
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        let domain = normalize_domain(domain);
        let map = self.tenants.read().map_err(|_| poisoned())?;
        Ok(map.values().find(|t| t.domain == domain).cloned())
    }

    async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let map = self.tenants.read().map_err(|_| poisoned())?;
        Ok(map.get(&tenant_id).cloned())
    }
}

type UserKey = (TenantId, UserId);

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<UserKey, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-formed user row (dev fixtures, tests).
    pub fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut map = self.write()?;
        if map
            .values()
            .any(|u| u.tenant_id == user.tenant_id && u.email == user.email && u.id != user.id)
        {
            return Err(StoreError::Conflict);
        }
        map.insert((user.tenant_id, user.id), user);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<UserKey, User>>, StoreError> {
        self.users.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<UserKey, User>>, StoreError> {
        self.users.write().map_err(|_| poisoned())
    }

    /// Apply `f` to the single row visible at `(tenant_id, user_id)` in `scope`.
    fn modify<F>(&self, scope: &TenantScope, tenant_id: TenantId, user_id: UserId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut User),
    {
        self.modify_where(scope, tenant_id, user_id, |_| true, f)
    }

    /// Like [`Self::modify`], but only when `guard` holds for the row. The
    /// check and the write happen under one write lock.
    fn modify_where<G, F>(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        guard: G,
        f: F,
    ) -> Result<(), StoreError>
    where
        G: FnOnce(&User) -> bool,
        F: FnOnce(&mut User),
    {
        scope.admit(tenant_id)?;
        let mut map = self.write()?;
        let user = map
            .get_mut(&(tenant_id, user_id))
            .filter(|u| scope.permits(u.tenant_id) && guard(u))
            .ok_or(StoreError::NotFound)?;
        f(user);
        Ok(())
    }

    #[cfg(test)]
    fn insert_under_key(&self, key_tenant: TenantId, user: User) {
        if let Ok(mut map) = self.users.write() {
            map.insert((key_tenant, user.id), user);
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        scope.admit(tenant_id)?;
        let map = self.read()?;
        Ok(map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .filter(|(_, u)| scope.permits(u.tenant_id))
            .find(|(_, u)| u.email == email)
            .map(|(_, u)| u.clone()))
    }

    async fn find_by_id(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<User>, StoreError> {
        scope.admit(tenant_id)?;
        let map = self.read()?;
        Ok(map
            .get(&(tenant_id, user_id))
            .filter(|u| scope.permits(u.tenant_id))
            .cloned())
    }

    async fn locate_by_email_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<UserLocator>, StoreError> {
        let map = self.read()?;
        Ok(map
            .values()
            .find(|u| u.email_verification_token.as_deref() == Some(token))
            .map(|u| UserLocator {
                user_id: u.id,
                tenant_id: u.tenant_id,
            }))
    }

    async fn locate_by_password_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserLocator>, StoreError> {
        let map = self.read()?;
        Ok(map
            .values()
            .find(|u| u.password_reset_token.as_deref() == Some(token) && u.reset_token_live(now))
            .map(|u| UserLocator {
                user_id: u.id,
                tenant_id: u.tenant_id,
            }))
    }

    async fn create(&self, scope: &TenantScope, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        scope.admit(user.tenant_id)?;
        let user = User::from_new(user, now);

        let mut map = self.write()?;
        // Mirrors the (tenant_id, email) unique constraint.
        if map
            .values()
            .any(|u| u.tenant_id == user.tenant_id && u.email == user.email)
        {
            return Err(StoreError::Conflict);
        }
        map.insert((user.tenant_id, user.id), user.clone());
        Ok(user)
    }

    async fn update_password_hash(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.modify(scope, tenant_id, user_id, |u| {
            u.password_hash = password_hash.to_string();
            u.password_reset_token = None;
            u.password_reset_expires_at = None;
            u.updated_at = now;
        })
    }

    async fn consume_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.modify_where(
            scope,
            tenant_id,
            user_id,
            |u| u.password_reset_token.as_deref() == Some(token) && u.reset_token_live(now),
            |u| {
                u.password_hash = password_hash.to_string();
                u.password_reset_token = None;
                u.password_reset_expires_at = None;
                u.updated_at = now;
            },
        )
    }

    async fn set_verification_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError> {
        self.modify(scope, tenant_id, user_id, |u| {
            u.email_verification_token = Some(token.to_string());
        })
    }

    async fn set_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.modify(scope, tenant_id, user_id, |u| {
            u.password_reset_token = Some(token.to_string());
            u.password_reset_expires_at = Some(expires_at);
        })
    }

    async fn clear_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        self.modify(scope, tenant_id, user_id, |u| {
            u.password_reset_token = None;
            u.password_reset_expires_at = None;
        })
    }

    async fn verify_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError> {
        self.modify_where(
            scope,
            tenant_id,
            user_id,
            |u| u.email_verification_token.as_deref() == Some(token),
            |u| {
                u.email_verified = true;
                u.email_verification_token = None;
                if u.status == UserStatus::Pending {
                    u.status = UserStatus::Active;
                }
            },
        )
    }

    async fn update_status(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        status: UserStatus,
    ) -> Result<(), StoreError> {
        self.modify(scope, tenant_id, user_id, |u| u.status = status)
    }

    async fn update_last_login(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.modify(scope, tenant_id, user_id, |u| {
            u.last_login_at = Some(at);
            u.updated_at = at;
        })
    }
}
