//! Signed access/refresh token issuance and verification (HS256).
//!
//! Access and refresh tokens are signed with two different secrets, so a
//! leaked access secret cannot mint refresh tokens and vice versa. Tokens are
//! never stored; the optional [`TokenDenylist`] is the only server-side state.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use academia_core::{BranchId, TenantId, UserId};

use crate::claims::{AccessClaims, REFRESH_TOKEN_TYPE, RefreshClaims, TokenValidationError, validate_window};
use crate::config::AuthConfig;
use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token configuration error: {0}")]
    Config(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Window(#[from] TokenValidationError),

    #[error("wrong token type")]
    WrongType,

    #[error("token has been revoked")]
    Revoked,
}

/// Revocation list keyed by `jti`.
///
/// Not part of the default deployment: without one, logout is advisory and
/// tokens live until `exp`.
pub trait TokenDenylist: Send + Sync {
    /// Record `jti` until `expires_at`. Returns false when the entry could
    /// not be stored.
    fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>) -> bool;

    fn is_revoked(&self, jti: &Uuid, now: DateTime<Utc>) -> bool;
}

/// What goes into an access token.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
    pub email: String,
    pub branch_id: Option<BranchId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    denylist: Option<Arc<dyn TokenDenylist>>,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("denylist", &self.denylist.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        if config.access_token_secret.is_empty() || config.refresh_token_secret.is_empty() {
            return Err(TokenError::Config("token secrets must not be empty".into()));
        }
        if config.access_token_secret == config.refresh_token_secret {
            return Err(TokenError::Config(
                "access and refresh token secrets must differ".into(),
            ));
        }
        let access_ttl = lifetime(config.access_token_lifetime_secs)?;
        let refresh_ttl = lifetime(config.refresh_token_lifetime_secs)?;

        Ok(Self {
            access: KeyPair::from_secret(&config.access_token_secret),
            refresh: KeyPair::from_secret(&config.refresh_token_secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl,
            refresh_ttl,
            denylist: None,
        })
    }

    pub fn with_denylist(mut self, denylist: Arc<dyn TokenDenylist>) -> Self {
        self.denylist = Some(denylist);
        self
    }

    pub fn access_ttl_secs(&self) -> u64 {
        u64::try_from(self.access_ttl.num_seconds()).unwrap_or(0)
    }

    pub fn issue_access_token(&self, grant: &AccessGrant, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = AccessClaims {
            sub: grant.user_id,
            tenant_id: grant.tenant_id,
            role: grant.role,
            email: grant.email.clone(),
            branch_id: grant.branch_id,
            iat: now,
            exp: now + self.access_ttl,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
        };
        sign(&claims, &self.access.encoding)
    }

    pub fn issue_refresh_token(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            sub: user_id,
            tenant_id,
            typ: REFRESH_TOKEN_TYPE.to_string(),
            iat: now,
            exp: now + self.refresh_ttl,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
        };
        sign(&claims, &self.refresh.encoding)
    }

    pub fn issue_pair(&self, grant: &AccessGrant, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(grant, now)?,
            refresh_token: self.issue_refresh_token(grant.user_id, grant.tenant_id, now)?,
            expires_in: self.access_ttl_secs(),
        })
    }

    pub fn verify_access_token(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token, &self.access.decoding)?;
        validate_window(claims.iat, claims.exp, now)?;
        self.check_denylist(&claims.jti, now)?;
        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode(token, &self.refresh.decoding)?;
        if claims.typ != REFRESH_TOKEN_TYPE {
            return Err(TokenError::WrongType);
        }
        validate_window(claims.iat, claims.exp, now)?;
        self.check_denylist(&claims.jti, now)?;
        Ok(claims)
    }

    /// Revoke an access token. Returns false when no denylist is configured
    /// or the denylist could not record the entry.
    pub fn revoke(&self, claims: &AccessClaims) -> bool {
        match &self.denylist {
            Some(denylist) => denylist.revoke(claims.jti, claims.exp),
            None => false,
        }
    }

    fn decode<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time is checked against the caller's clock in `validate_window`.
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);

        jsonwebtoken::decode::<T>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Rejected(e.to_string()))
    }

    fn check_denylist(&self, jti: &Uuid, now: DateTime<Utc>) -> Result<(), TokenError> {
        match &self.denylist {
            Some(denylist) if denylist.is_revoked(jti, now) => Err(TokenError::Revoked),
            _ => Ok(()),
        }
    }
}

fn lifetime(secs: u64) -> Result<Duration, TokenError> {
    let secs = i64::try_from(secs).map_err(|_| TokenError::Config("token lifetime out of range".into()))?;
    if secs <= 0 {
        return Err(TokenError::Config("token lifetime must be positive".into()));
    }
    Ok(Duration::seconds(secs))
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, TokenError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| TokenError::Signing(e.to_string()))
}

/// Parse an `Authorization` header value of the form `Bearer <token>`.
///
/// Any other shape yields `None`; callers decide whether that means
/// "unauthenticated" or "reject".
pub fn extract_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Random single-use token for email verification and password reset
/// (32 bytes, base64url without padding).
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            access_token_secret: "access-secret".into(),
            refresh_token_secret: "refresh-secret".into(),
            ..AuthConfig::default()
        }
    }

    fn grant() -> AccessGrant {
        AccessGrant {
            user_id: UserId::new(),
            tenant_id: TenantId::new(),
            role: Role::Coach,
            email: "coach@gym1".into(),
            branch_id: Some(BranchId::new()),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let svc = TokenService::new(&config()).unwrap();
        let g = grant();
        let now = Utc::now();
        let token = svc.issue_access_token(&g, now).unwrap();
        let claims = svc.verify_access_token(&token, now).unwrap();
        assert_eq!(claims.sub, g.user_id);
        assert_eq!(claims.tenant_id, g.tenant_id);
        assert_eq!(claims.role, Role::Coach);
        assert_eq!(claims.branch_id, g.branch_id);
        assert_eq!(claims.iss, "academia");
        assert_eq!(claims.aud, "academia-api");
    }

    #[test]
    fn refresh_token_accepted_before_expiry_rejected_after() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let token = svc.issue_refresh_token(UserId::new(), TenantId::new(), now).unwrap();

        assert!(svc.verify_refresh_token(&token, now + Duration::days(29)).is_ok());
        assert_eq!(
            svc.verify_refresh_token(&token, now + Duration::days(30)),
            Err(TokenError::Window(TokenValidationError::Expired))
        );
    }

    #[test]
    fn access_token_is_never_a_refresh_token() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let access = svc.issue_access_token(&grant(), now).unwrap();
        assert!(svc.verify_refresh_token(&access, now).is_err());
    }

    #[test]
    fn refresh_token_is_never_an_access_token() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let refresh = svc.issue_refresh_token(UserId::new(), TenantId::new(), now).unwrap();
        assert!(svc.verify_access_token(&refresh, now).is_err());
    }

    #[test]
    fn refresh_signed_with_refresh_key_but_wrong_type_is_rejected() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let forged = RefreshClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            typ: "access".into(),
            iat: now,
            exp: now + Duration::hours(1),
            iss: "academia".into(),
            aud: "academia-api".into(),
            jti: Uuid::new_v4(),
        };
        let token = sign(&forged, &svc.refresh.encoding).unwrap();
        assert_eq!(svc.verify_refresh_token(&token, now), Err(TokenError::WrongType));
    }

    #[test]
    fn foreign_secret_issuer_or_audience_is_rejected() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();

        let other_secret = TokenService::new(&AuthConfig {
            access_token_secret: "another-access".into(),
            ..config()
        })
        .unwrap();
        let token = other_secret.issue_access_token(&grant(), now).unwrap();
        assert!(matches!(svc.verify_access_token(&token, now), Err(TokenError::Rejected(_))));

        let other_issuer = TokenService::new(&AuthConfig {
            issuer: "elsewhere".into(),
            ..config()
        })
        .unwrap();
        let token = other_issuer.issue_access_token(&grant(), now).unwrap();
        assert!(matches!(svc.verify_access_token(&token, now), Err(TokenError::Rejected(_))));

        let other_audience = TokenService::new(&AuthConfig {
            audience: "billing".into(),
            ..config()
        })
        .unwrap();
        let token = other_audience.issue_access_token(&grant(), now).unwrap();
        assert!(matches!(svc.verify_access_token(&token, now), Err(TokenError::Rejected(_))));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let mut token = svc.issue_access_token(&grant(), now).unwrap();
        token.push('x');
        assert!(svc.verify_access_token(&token, now).is_err());
    }

    #[test]
    fn identical_or_empty_secrets_are_refused() {
        let same = AuthConfig {
            access_token_secret: "s".into(),
            refresh_token_secret: "s".into(),
            ..AuthConfig::default()
        };
        assert!(matches!(TokenService::new(&same), Err(TokenError::Config(_))));
        assert!(matches!(
            TokenService::new(&AuthConfig::default()),
            Err(TokenError::Config(_))
        ));
    }

    #[derive(Default)]
    struct MapDenylist(Mutex<HashMap<Uuid, DateTime<Utc>>>);

    impl TokenDenylist for MapDenylist {
        fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>) -> bool {
            self.0.lock().unwrap().insert(jti, expires_at);
            true
        }

        fn is_revoked(&self, jti: &Uuid, _now: DateTime<Utc>) -> bool {
            self.0.lock().unwrap().contains_key(jti)
        }
    }

    #[test]
    fn denylist_revokes_access_tokens() {
        let svc = TokenService::new(&config())
            .unwrap()
            .with_denylist(Arc::new(MapDenylist::default()));
        let now = Utc::now();
        let token = svc.issue_access_token(&grant(), now).unwrap();
        let claims = svc.verify_access_token(&token, now).unwrap();
        assert!(svc.revoke(&claims));
        assert_eq!(svc.verify_access_token(&token, now), Err(TokenError::Revoked));
    }

    struct BrokenDenylist;

    impl TokenDenylist for BrokenDenylist {
        fn revoke(&self, _jti: Uuid, _expires_at: DateTime<Utc>) -> bool {
            false
        }

        fn is_revoked(&self, _jti: &Uuid, _now: DateTime<Utc>) -> bool {
            false
        }
    }

    #[test]
    fn failed_revocation_is_reported() {
        let svc = TokenService::new(&config())
            .unwrap()
            .with_denylist(Arc::new(BrokenDenylist));
        let now = Utc::now();
        let token = svc.issue_access_token(&grant(), now).unwrap();
        let claims = svc.verify_access_token(&token, now).unwrap();
        assert!(!svc.revoke(&claims));
    }

    #[test]
    fn revoke_without_denylist_is_advisory() {
        let svc = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let token = svc.issue_access_token(&grant(), now).unwrap();
        let claims = svc.verify_access_token(&token, now).unwrap();
        assert!(!svc.revoke(&claims));
        assert!(svc.verify_access_token(&token, now).is_ok());
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("Bearer   "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer("bearer abc"), None);
        assert_eq!(extract_bearer("Bearer a b"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[test]
    fn opaque_tokens_are_url_safe_and_unique() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
