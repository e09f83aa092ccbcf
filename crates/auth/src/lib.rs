//! `academia-auth` — authentication and tenant isolation core.
//!
//! This crate is intentionally decoupled from HTTP and storage: adapters
//! implement the traits in [`repository`], and the HTTP layer maps
//! [`AuthError`] to responses.

pub mod authorize;
pub mod claims;
pub mod config;
pub mod error;
pub mod password;
pub mod principal;
pub mod repository;
pub mod roles;
pub mod scope;
pub mod service;
pub mod tenant;
pub mod token;
pub mod user;
pub mod validation;

pub use authorize::{
    AuthorizationExplanation, explain, require_role, require_same_branch, require_same_tenant,
    require_self_or_elevated,
};
pub use claims::{AccessClaims, REFRESH_TOKEN_TYPE, RefreshClaims, TokenValidationError, validate_window};
pub use config::{AuthConfig, PasswordParams};
pub use error::AuthError;
pub use password::{PasswordError, PasswordHasher};
pub use principal::Principal;
pub use repository::{AuthNotifier, CredentialStore, StoreError, TenantDirectory};
pub use roles::{Role, UnknownRole};
pub use scope::TenantScope;
pub use service::{AuthService, AuthSession, Identity, LoginInput, RegisterInput};
pub use tenant::{ContactInfo, LicensePlan, Tenant, normalize_domain};
pub use token::{
    AccessGrant, TokenDenylist, TokenError, TokenPair, TokenService, extract_bearer, generate_opaque_token,
};
pub use user::{NewUser, PublicUser, User, UserLocator, UserStatus, normalize_email};
