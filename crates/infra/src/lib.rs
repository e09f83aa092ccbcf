//! Infrastructure layer: storage adapters, notification and revocation.

pub mod denylist;
pub mod notifier;
pub mod store;

mod integration_tests;

pub use denylist::InMemoryDenylist;
pub use notifier::{LoggingNotifier, Notification, NotificationKind, OutboxNotifier};
pub use store::{InMemoryCredentialStore, InMemoryTenantDirectory, PgCredentialStore, PgTenantDirectory};
