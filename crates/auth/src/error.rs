//! Authentication error taxonomy.

use std::collections::BTreeMap;

use thiserror::Error;

use academia_core::DomainError;

use crate::password::PasswordError;
use crate::repository::StoreError;
use crate::token::TokenError;

/// Every failure the authentication core can report.
///
/// All variants except [`AuthError::Internal`] are expected outcomes that the
/// HTTP boundary maps to a 4xx with a stable code. `Internal` carries detail
/// for logs only; it is never echoed to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("tenant not found")]
    TenantNotFound,

    #[error("tenant is inactive")]
    TenantInactive,

    #[error("tenant license has expired")]
    LicenseExpired,

    /// Deliberately identical for unknown email and wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is suspended")]
    AccountSuspended,

    #[error("account is inactive")]
    AccountInactive,

    #[error("account is pending email verification")]
    AccountPending,

    #[error("a user with this email already exists")]
    UserExists,

    #[error("user not found")]
    UserNotFound,

    #[error("email is already verified")]
    AlreadyVerified,

    #[error("invalid token")]
    InvalidToken,

    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("insufficient permissions")]
    InsufficientPermissions,

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TenantNotFound => "tenant_not_found",
            AuthError::TenantInactive => "tenant_inactive",
            AuthError::LicenseExpired => "license_expired",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountSuspended => "account_suspended",
            AuthError::AccountInactive => "account_inactive",
            AuthError::AccountPending => "account_pending",
            AuthError::UserExists => "user_exists",
            AuthError::UserNotFound => "user_not_found",
            AuthError::AlreadyVerified => "already_verified",
            AuthError::InvalidToken => "invalid_token",
            AuthError::InvalidOrExpiredToken => "invalid_or_expired_token",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::TenantMismatch => "tenant_mismatch",
            AuthError::Validation(_) => "validation_error",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(fields) => AuthError::Validation(fields),
            DomainError::InvalidId(msg) => {
                let mut fields = BTreeMap::new();
                fields.insert("id".to_string(), msg);
                AuthError::Validation(fields)
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::UserExists,
            StoreError::NotFound => AuthError::UserNotFound,
            StoreError::ScopeViolation => AuthError::internal("tenant scope violation"),
            StoreError::Unavailable(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AuthError::Internal(msg),
            _ => AuthError::InvalidToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_and_wrong_password_share_a_message() {
        // Both login failure paths construct this single variant.
        assert_eq!(AuthError::InvalidCredentials.to_string(), "invalid email or password");
        assert_eq!(AuthError::InvalidCredentials.code(), "invalid_credentials");
    }

    #[test]
    fn store_conflict_maps_to_user_exists() {
        assert_eq!(AuthError::from(StoreError::Conflict), AuthError::UserExists);
    }

    #[test]
    fn scope_violation_is_internal() {
        let err = AuthError::from(StoreError::ScopeViolation);
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn domain_validation_keeps_fields() {
        let err = AuthError::from(DomainError::validation("email", "is required"));
        match err {
            AuthError::Validation(fields) => assert_eq!(fields["email"], "is required"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
