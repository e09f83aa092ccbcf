//! Authentication service: login, registration, token refresh, password
//! change/reset and email verification.
//!
//! Generic over the storage and notification seams so the auth layer has no
//! dependency on a database or HTTP crate. Every storage call carries a
//! [`TenantScope`] bound to the tenant resolved for that request.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use academia_core::{BranchId, FieldErrors, UserId};

use crate::claims::AccessClaims;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::PasswordHasher;
use crate::principal::Principal;
use crate::repository::{AuthNotifier, CredentialStore, StoreError, TenantDirectory};
use crate::scope::TenantScope;
use crate::tenant::{Tenant, normalize_domain};
use crate::token::{AccessGrant, TokenPair, TokenService, generate_opaque_token};
use crate::user::{NewUser, PublicUser, User, UserStatus, normalize_email};
use crate::validation::{check_account_lookup, check_email, check_password, check_required};
use crate::Role;

/// Input for the login flow.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub tenant_domain: String,
}

/// Input for self-registration.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub tenant_domain: String,
    pub branch_id: Option<BranchId>,
}

/// Successful login or registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: PublicUser,
    pub tenant: Tenant,
    /// Absent when registration does not auto-authenticate.
    pub tokens: Option<TokenPair>,
}

/// The caller's own account and tenant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user: PublicUser,
    pub tenant: Tenant,
}

pub struct AuthService<D: TenantDirectory, S: CredentialStore, N: AuthNotifier> {
    tenants: D,
    users: S,
    notifier: N,
    tokens: Arc<TokenService>,
    hasher: PasswordHasher,
    config: AuthConfig,
}

impl<D: TenantDirectory, S: CredentialStore, N: AuthNotifier> AuthService<D, S, N> {
    pub fn new(
        tenants: D,
        users: S,
        notifier: N,
        tokens: Arc<TokenService>,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let hasher = PasswordHasher::new(config.password_params)?;
        Ok(Self {
            tenants,
            users,
            notifier,
            tokens,
            hasher,
            config,
        })
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Verify a bearer access token.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, AuthError> {
        self.tokens.verify_access_token(token, now).map_err(|e| {
            tracing::debug!(error = %e, "access token rejected");
            AuthError::InvalidToken
        })
    }

    /// Authenticate with email + password inside one tenant and issue tokens.
    #[instrument(skip(self, input, now), fields(tenant_domain = %input.tenant_domain), err)]
    pub async fn login(&self, input: LoginInput, now: DateTime<Utc>) -> Result<AuthSession, AuthError> {
        let mut errors = FieldErrors::new();
        check_email(&mut errors, "email", &input.email);
        if input.password.is_empty() {
            errors.add("password", "is required");
        }
        check_required(&mut errors, "tenantDomain", &input.tenant_domain);
        errors.into_result()?;

        // 1. Tenant must exist and be usable.
        let tenant = self.resolve_tenant(&input.tenant_domain).await?;
        if let Err(err) = tenant.gate(now) {
            tracing::warn!(tenant_id = %tenant.id, code = err.code(), "login refused by tenant gate");
            return Err(err);
        }
        let scope = TenantScope::bind(tenant.id);

        // 2 + 3. Unknown email and wrong password cost the same and fail the same.
        let user = self
            .users
            .find_by_email(&scope, tenant.id, &normalize_email(&input.email))
            .await?;
        let verified = self
            .hasher
            .verify_blocking(&input.password, user.as_ref().map(|u| u.password_hash.as_str()))
            .await?;
        let Some(user) = user.filter(|_| verified) else {
            tracing::warn!(tenant_id = %tenant.id, "login failed: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        // 4. Account status.
        login_gate(user.status)?;

        // 5. Stamp and issue.
        self.users
            .update_last_login(&scope, tenant.id, user.id, now)
            .await?;
        let tokens = self.tokens.issue_pair(&grant_for(&user), now)?;

        let mut public = user.to_public();
        public.last_login_at = Some(now);

        tracing::info!(tenant_id = %tenant.id, user_id = %user.id, role = %user.role, "login succeeded");
        Ok(AuthSession {
            user: public,
            tenant,
            tokens: Some(tokens),
        })
    }

    /// Create a `pending` account and dispatch its verification token.
    #[instrument(skip(self, input, now), fields(tenant_domain = %input.tenant_domain), err)]
    pub async fn register(&self, input: RegisterInput, now: DateTime<Utc>) -> Result<AuthSession, AuthError> {
        let mut errors = FieldErrors::new();
        check_email(&mut errors, "email", &input.email);
        check_password(&mut errors, "password", &input.password, self.config.min_password_length);
        check_required(&mut errors, "firstName", &input.first_name);
        check_required(&mut errors, "lastName", &input.last_name);
        check_required(&mut errors, "tenantDomain", &input.tenant_domain);
        errors.into_result()?;

        let tenant = self.resolve_tenant(&input.tenant_domain).await?;
        tenant.gate(now)?;

        if !self.config.self_registration_max_role.satisfies(input.role) {
            tracing::warn!(
                tenant_id = %tenant.id,
                requested = %input.role,
                ceiling = %self.config.self_registration_max_role,
                "registration refused: role above self-registration ceiling"
            );
            return Err(AuthError::InsufficientPermissions);
        }

        let password_hash = self.hasher.hash_blocking(&input.password).await?;
        let verification_token = generate_opaque_token();
        let scope = TenantScope::bind(tenant.id);

        let new_user = NewUser {
            id: UserId::new(),
            tenant_id: tenant.id,
            email: normalize_email(&input.email),
            password_hash,
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            phone: input
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            role: input.role,
            status: UserStatus::Pending,
            branch_id: input.branch_id,
            email_verification_token: Some(verification_token.clone()),
        };

        // The (tenant_id, email) unique constraint decides duplicates.
        let user = self.users.create(&scope, new_user, now).await?;
        tracing::info!(tenant_id = %tenant.id, user_id = %user.id, role = %user.role, "user registered");

        if let Err(err) = self
            .notifier
            .send_email_verification(&tenant, &user, &verification_token)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %err, "verification delivery failed");
        }

        let tokens = if self.config.issue_tokens_on_register {
            Some(self.tokens.issue_pair(&grant_for(&user), now)?)
        } else {
            None
        };

        Ok(AuthSession {
            user: user.to_public(),
            tenant,
            tokens,
        })
    }

    /// Exchange a refresh token for a new pair minted with the user's current
    /// role.
    #[instrument(skip_all, err)]
    pub async fn refresh_token(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify_refresh_token(refresh_token, now).map_err(|e| {
            tracing::debug!(error = %e, "refresh token rejected");
            AuthError::InvalidOrExpiredToken
        })?;

        let tenant = self
            .tenants
            .find_by_id(claims.tenant_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        tenant.gate(now)?;

        let scope = TenantScope::bind(tenant.id);
        let user = self
            .users
            .find_by_id(&scope, tenant.id, claims.sub)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        match user.status {
            UserStatus::Suspended => return Err(AuthError::AccountSuspended),
            UserStatus::Inactive => return Err(AuthError::AccountInactive),
            UserStatus::Active | UserStatus::Pending => {}
        }

        tracing::debug!(tenant_id = %tenant.id, user_id = %user.id, "tokens refreshed");
        Ok(self.tokens.issue_pair(&grant_for(&user), now)?)
    }

    #[instrument(skip(self, current_password, new_password, now), fields(tenant_id = %principal.tenant_id, user_id = %principal.user_id), err)]
    pub async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut errors = FieldErrors::new();
        if current_password.is_empty() {
            errors.add("currentPassword", "is required");
        }
        check_password(&mut errors, "newPassword", new_password, self.config.min_password_length);
        errors.into_result()?;

        let scope = TenantScope::bind(principal.tenant_id);
        let user = self
            .users
            .find_by_id(&scope, principal.tenant_id, principal.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .hasher
            .verify_blocking(current_password, Some(&user.password_hash))
            .await?
        {
            tracing::warn!("password change refused: current password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hasher.hash_blocking(new_password).await?;
        self.users
            .update_password_hash(&scope, user.tenant_id, user.id, &password_hash, now)
            .await?;
        tracing::info!("password changed");
        Ok(())
    }

    /// Issue a reset token. Succeeds silently when the tenant or email is
    /// unknown so the response reveals nothing.
    #[instrument(skip(self, email, now), err)]
    pub async fn request_password_reset(
        &self,
        email: &str,
        tenant_domain: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        check_account_lookup(email, tenant_domain)?;

        let Some((tenant, user)) = self.lookup_account(email, tenant_domain).await? else {
            return Ok(());
        };

        let token = generate_opaque_token();
        let expires_at = now + Duration::seconds(self.config.password_reset_lifetime_secs as i64);
        let scope = TenantScope::bind(tenant.id);
        self.users
            .set_reset_token(&scope, tenant.id, user.id, &token, expires_at)
            .await?;

        if let Err(err) = self
            .notifier
            .send_password_reset(&tenant, &user, &token, expires_at)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %err, "password reset delivery failed");
        }
        tracing::info!(tenant_id = %tenant.id, user_id = %user.id, "password reset requested");
        Ok(())
    }

    /// Consume a reset token. The new hash and the cleared token land in one
    /// write, so a token works at most once.
    #[instrument(skip_all, err)]
    pub async fn reset_password(&self, token: &str, new_password: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let mut errors = FieldErrors::new();
        check_required(&mut errors, "token", token);
        check_password(&mut errors, "newPassword", new_password, self.config.min_password_length);
        errors.into_result()?;

        let user = self
            .users
            .find_by_password_reset_token(token, now)
            .await?
            .filter(|u| u.password_reset_token.as_deref() == Some(token) && u.reset_token_live(now))
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let password_hash = self.hasher.hash_blocking(new_password).await?;
        let scope = TenantScope::bind(user.tenant_id);
        // Conditional on the token: a concurrent redemption leaves nothing to consume.
        self.users
            .consume_reset_token(&scope, user.tenant_id, user.id, token, &password_hash, now)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AuthError::InvalidOrExpiredToken,
                other => other.into(),
            })?;

        tracing::info!(tenant_id = %user.tenant_id, user_id = %user.id, "password reset completed");
        Ok(())
    }

    #[instrument(skip_all, err)]
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let user = self
            .users
            .find_by_email_verification_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let scope = TenantScope::bind(user.tenant_id);
        self.users
            .verify_email(&scope, user.tenant_id, user.id, token)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AuthError::InvalidToken,
                other => other.into(),
            })?;
        tracing::info!(tenant_id = %user.tenant_id, user_id = %user.id, "email verified");
        Ok(())
    }

    /// Replace the verification token and send it again. Unknown tenant or
    /// email succeeds silently.
    #[instrument(skip(self, email), err)]
    pub async fn resend_email_verification(&self, email: &str, tenant_domain: &str) -> Result<(), AuthError> {
        check_account_lookup(email, tenant_domain)?;

        let Some((tenant, user)) = self.lookup_account(email, tenant_domain).await? else {
            return Ok(());
        };
        if user.email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let token = generate_opaque_token();
        let scope = TenantScope::bind(tenant.id);
        self.users
            .set_verification_token(&scope, tenant.id, user.id, &token)
            .await?;

        if let Err(err) = self
            .notifier
            .send_email_verification(&tenant, &user, &token)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %err, "verification delivery failed");
        }
        Ok(())
    }

    /// Advisory unless a denylist is configured. Returns whether the token was
    /// revoked server-side.
    pub fn logout(&self, claims: &AccessClaims) -> bool {
        let revoked = self.tokens.revoke(claims);
        tracing::info!(tenant_id = %claims.tenant_id, user_id = %claims.sub, revoked, "logout");
        revoked
    }

    #[instrument(skip(self), fields(tenant_id = %principal.tenant_id, user_id = %principal.user_id), err)]
    pub async fn current_identity(&self, principal: &Principal) -> Result<Identity, AuthError> {
        let tenant = self
            .tenants
            .find_by_id(principal.tenant_id)
            .await?
            .ok_or(AuthError::TenantNotFound)?;
        let scope = TenantScope::bind(tenant.id);
        let user = self
            .users
            .find_by_id(&scope, tenant.id, principal.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(Identity {
            user: user.to_public(),
            tenant,
        })
    }

    async fn resolve_tenant(&self, domain: &str) -> Result<Tenant, AuthError> {
        self.tenants
            .find_by_domain(&normalize_domain(domain))
            .await?
            .ok_or_else(|| {
                tracing::warn!("tenant not found for domain");
                AuthError::TenantNotFound
            })
    }

    /// Tenant + user for the anti-enumeration flows; `None` on any miss.
    async fn lookup_account(&self, email: &str, tenant_domain: &str) -> Result<Option<(Tenant, User)>, AuthError> {
        let Some(tenant) = self.tenants.find_by_domain(&normalize_domain(tenant_domain)).await? else {
            tracing::debug!("account lookup: unknown tenant");
            return Ok(None);
        };
        let scope = TenantScope::bind(tenant.id);
        match self
            .users
            .find_by_email(&scope, tenant.id, &normalize_email(email))
            .await?
        {
            Some(user) => Ok(Some((tenant, user))),
            None => {
                tracing::debug!(tenant_id = %tenant.id, "account lookup: unknown email");
                Ok(None)
            }
        }
    }
}

fn grant_for(user: &User) -> AccessGrant {
    AccessGrant {
        user_id: user.id,
        tenant_id: user.tenant_id,
        role: user.role,
        email: user.email.clone(),
        branch_id: user.branch_id,
    }
}

/// Only active accounts may log in with a password.
fn login_gate(status: UserStatus) -> Result<(), AuthError> {
    match status {
        UserStatus::Active => Ok(()),
        UserStatus::Suspended => Err(AuthError::AccountSuspended),
        UserStatus::Inactive => Err(AuthError::AccountInactive),
        UserStatus::Pending => Err(AuthError::AccountPending),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_accounts_pass_login_gate() {
        assert!(login_gate(UserStatus::Active).is_ok());
        assert_eq!(login_gate(UserStatus::Suspended), Err(AuthError::AccountSuspended));
        assert_eq!(login_gate(UserStatus::Inactive), Err(AuthError::AccountInactive));
        assert_eq!(login_gate(UserStatus::Pending), Err(AuthError::AccountPending));
    }
}
