//! Tenant directory and credential store adapters.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryCredentialStore, InMemoryTenantDirectory};
pub use postgres::{PgCredentialStore, PgTenantDirectory};
