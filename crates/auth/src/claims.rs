use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use academia_core::{BranchId, TenantId, UserId};

use crate::Role;

/// Marker carried by refresh tokens in the `typ` claim.
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims of an access token.
///
/// Timestamps travel as JWT NumericDate (seconds since the epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Tenant the identity is bound to.
    pub tenant_id: TenantId,

    pub role: Role,

    pub email: String,

    /// Home branch, when the user is attached to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,

    pub iss: String,

    pub aud: String,

    /// Unique token id; key for the optional denylist.
    pub jti: Uuid,
}

/// Claims of a refresh token. No role: it is re-read from the user record
/// whenever the token is redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: UserId,

    pub tenant_id: TenantId,

    /// Always [`REFRESH_TOKEN_TYPE`]; stops an access token being replayed as
    /// a refresh token.
    pub typ: String,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,

    pub iss: String,

    pub aud: String,

    pub jti: Uuid,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate a token's time window against `now`.
///
/// Signature, issuer and audience are checked by the token service before
/// this runs.
pub fn validate_window(
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if expires_at <= issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_accepts_inside_and_rejects_edges() {
        let iat = Utc::now();
        let exp = iat + Duration::minutes(10);
        assert_eq!(validate_window(iat, exp, iat), Ok(()));
        assert_eq!(validate_window(iat, exp, exp), Err(TokenValidationError::Expired));
        assert_eq!(
            validate_window(iat, exp, iat - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_window(exp, iat, iat),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn access_claims_use_numeric_dates() {
        let iat = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let claims = AccessClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            role: Role::Coach,
            email: "coach@gym1".into(),
            branch_id: None,
            iat,
            exp: iat + Duration::days(7),
            iss: "academia".into(),
            aud: "academia-api".into(),
            jti: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["iat"], 1_700_000_000);
        assert_eq!(json["role"], "coach");
        assert!(json.get("branch_id").is_none());
    }
}
