//! User account record and its client-facing projection.
//!
//! A user belongs to exactly one tenant for its whole life; the pair
//! `(tenant_id, email)` is unique, the email alone is not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use academia_core::{BranchId, TenantId, UserId};

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// Account status.
///
/// `Pending` → `Active` happens on email verification. `Suspended` and
/// `Inactive` block authentication and are only reversed by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Registered, email not yet verified.
    #[default]
    Pending,
    /// User can authenticate.
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UserStatus::Pending),
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            "suspended" => Some(UserStatus::Suspended),
            _ => None,
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// Stored user record, including secrets. Never serialized to clients; use
/// [`PublicUser`] for responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub branch_id: Option<BranchId>,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Materialize a freshly registered account.
    pub fn from_new(new: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            tenant_id: new.tenant_id,
            email: normalize_email(&new.email),
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            phone: new.phone,
            role: new.role,
            status: new.status,
            branch_id: new.branch_id,
            email_verified: false,
            email_verification_token: new.email_verification_token,
            password_reset_token: None,
            password_reset_expires_at: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            tenant_id: self.tenant_id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            role: self.role,
            status: self.status,
            branch_id: self.branch_id,
            email_verified: self.email_verified,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }

    /// True while the outstanding reset token (if any) has not expired.
    pub fn reset_token_live(&self, now: DateTime<Utc>) -> bool {
        self.password_reset_token.is_some()
            && self.password_reset_expires_at.is_some_and(|exp| now < exp)
    }
}

/// Input for creating a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub branch_id: Option<BranchId>,
    pub email_verification_token: Option<String>,
}

/// Client-facing view of a user. Password material is write-only and has no
/// field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub branch_id: Option<BranchId>,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of a global token lookup: just enough to re-enter the tenant scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserLocator {
    pub user_id: UserId,
    pub tenant_id: TenantId,
}

/// Canonical email form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
