//! Authentication configuration.

use crate::Role;

/// Argon2id cost parameters (the tunable work factor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordParams {
    /// OWASP 2024 recommendation: m=19456 KiB, t=2, p=1.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Configuration for the authentication core.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub access_token_secret: String,
    /// HMAC secret for refresh tokens. Must differ from the access secret.
    pub refresh_token_secret: String,
    /// `iss` claim.
    pub issuer: String,
    /// `aud` claim.
    pub audience: String,
    /// Access token lifetime in seconds (default: 7 days).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 30 days).
    pub refresh_token_lifetime_secs: u64,
    /// Password reset token lifetime in seconds (default: 1 hour).
    pub password_reset_lifetime_secs: u64,
    pub password_params: PasswordParams,
    pub min_password_length: usize,
    /// Whether registration returns a token pair before the email is verified.
    pub issue_tokens_on_register: bool,
    /// Highest role a public registration may request.
    pub self_registration_max_role: Role,
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_lifetime_secs", &self.access_token_lifetime_secs)
            .field("refresh_token_lifetime_secs", &self.refresh_token_lifetime_secs)
            .field("password_reset_lifetime_secs", &self.password_reset_lifetime_secs)
            .field("password_params", &self.password_params)
            .field("min_password_length", &self.min_password_length)
            .field("issue_tokens_on_register", &self.issue_tokens_on_register)
            .field("self_registration_max_role", &self.self_registration_max_role)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            issuer: "academia".into(),
            audience: "academia-api".into(),
            access_token_lifetime_secs: 7 * 24 * 3600,
            refresh_token_lifetime_secs: 30 * 24 * 3600,
            password_reset_lifetime_secs: 3600,
            password_params: PasswordParams::default(),
            min_password_length: 8,
            issue_tokens_on_register: true,
            self_registration_max_role: Role::Student,
        }
    }
}
