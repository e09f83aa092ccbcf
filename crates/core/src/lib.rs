//! `academia-core` — shared identifiers and the domain error model.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).
//! Every other crate in the workspace speaks in these types, so a tenant id can
//! never be confused with a user id at a call site.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult, FieldErrors};
pub use id::{BranchId, TenantId, UserId};
