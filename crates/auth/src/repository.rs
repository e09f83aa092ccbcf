//! Storage and notification seams of the authentication core.
//!
//! The auth crate never talks to a database directly; adapters live in
//! `academia-infra`. Every tenant-scoped method takes both the request's
//! [`TenantScope`] and an explicit [`TenantId`] so that two independent checks
//! guard each row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use academia_core::{TenantId, UserId};

use crate::scope::TenantScope;
use crate::tenant::Tenant;
use crate::user::{NewUser, User, UserLocator, UserStatus};

/// Storage adapter error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint hit (duplicate `(tenant_id, email)`).
    #[error("conflict")]
    Conflict,

    /// Explicit tenant argument disagrees with the request scope.
    #[error("tenant scope violation")]
    ScopeViolation,

    /// A mutation matched no row visible in the scope.
    #[error("not found")]
    NotFound,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Read-only tenant lookup.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError>;

    async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError>;
}

/// Tenant-scoped user persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_id(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<User>, StoreError>;

    /// Global lookup. Verification tokens are unique across tenants.
    async fn locate_by_email_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<UserLocator>, StoreError>;

    /// Global lookup; matches only while `now < reset_expiry`.
    async fn locate_by_password_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserLocator>, StoreError>;

    async fn create(&self, scope: &TenantScope, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError>;

    /// Replace the password hash and clear any outstanding reset token in the
    /// same write.
    async fn update_password_hash(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Redeem a reset token: the new hash lands and the token is cleared only
    /// if `token` is still the stored one and unexpired at `now`. Otherwise
    /// `NotFound` and nothing is written.
    async fn consume_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Overwrites any previous verification token.
    async fn set_verification_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError>;

    /// Overwrites any previous reset token.
    async fn set_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn clear_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    /// Set verified, drop the verification token, promote `pending` to `active`.
    /// Applies only while `token` is still the stored verification token;
    /// otherwise `NotFound`.
    async fn verify_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        status: UserStatus,
    ) -> Result<(), StoreError>;

    async fn update_last_login(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Locate by verification token, then load the row inside its own tenant
    /// scope.
    async fn find_by_email_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        match self.locate_by_email_verification_token(token).await? {
            Some(loc) => {
                let scope = TenantScope::bind(loc.tenant_id);
                self.find_by_id(&scope, loc.tenant_id, loc.user_id).await
            }
            None => Ok(None),
        }
    }

    /// Locate by unexpired reset token, then load the row inside its own
    /// tenant scope.
    async fn find_by_password_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        match self.locate_by_password_reset_token(token, now).await? {
            Some(loc) => {
                let scope = TenantScope::bind(loc.tenant_id);
                self.find_by_id(&scope, loc.tenant_id, loc.user_id).await
            }
            None => Ok(None),
        }
    }
}

/// Outbound delivery of one-time tokens (email, SMS, ...).
#[async_trait]
pub trait AuthNotifier: Send + Sync {
    async fn send_email_verification(&self, tenant: &Tenant, user: &User, token: &str) -> Result<(), StoreError>;

    async fn send_password_reset(
        &self,
        tenant: &Tenant,
        user: &User,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T> TenantDirectory for Arc<T>
where
    T: TenantDirectory + ?Sized,
{
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        (**self).find_by_domain(domain).await
    }

    async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        (**self).find_by_id(tenant_id).await
    }
}

#[async_trait]
impl<T> CredentialStore for Arc<T>
where
    T: CredentialStore + ?Sized,
{
    async fn find_by_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        (**self).find_by_email(scope, tenant_id, email).await
    }

    async fn find_by_id(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<User>, StoreError> {
        (**self).find_by_id(scope, tenant_id, user_id).await
    }

    async fn locate_by_email_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<UserLocator>, StoreError> {
        (**self).locate_by_email_verification_token(token).await
    }

    async fn locate_by_password_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserLocator>, StoreError> {
        (**self).locate_by_password_reset_token(token, now).await
    }

    async fn create(&self, scope: &TenantScope, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        (**self).create(scope, user, now).await
    }

    async fn update_password_hash(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self)
            .update_password_hash(scope, tenant_id, user_id, password_hash, now)
            .await
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
        (**self)
            .consume_reset_token(scope, tenant_id, user_id, token, password_hash, now)
            .await
    }

    async fn set_verification_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError> {
        (**self).set_verification_token(scope, tenant_id, user_id, token).await
    }

    async fn set_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self)
            .set_reset_token(scope, tenant_id, user_id, token, expires_at)
            .await
    }

    async fn clear_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        (**self).clear_reset_token(scope, tenant_id, user_id).await
    }

    async fn verify_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError> {
        (**self).verify_email(scope, tenant_id, user_id, token).await
    }

    async fn update_status(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        status: UserStatus,
    ) -> Result<(), StoreError> {
        (**self).update_status(scope, tenant_id, user_id, status).await
    }

    async fn update_last_login(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).update_last_login(scope, tenant_id, user_id, at).await
    }
}

#[async_trait]
impl<T> AuthNotifier for Arc<T>
where
    T: AuthNotifier + ?Sized,
{
    async fn send_email_verification(&self, tenant: &Tenant, user: &User, token: &str) -> Result<(), StoreError> {
        (**self).send_email_verification(tenant, user, token).await
    }

    async fn send_password_reset(
        &self,
        tenant: &Tenant,
        user: &User,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).send_password_reset(tenant, user, token, expires_at).await
    }
}
