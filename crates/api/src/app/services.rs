//! Service wiring: storage adapters, notifier, token service.

use std::sync::Arc;

use academia_auth::{AuthConfig, AuthError, AuthNotifier, AuthService, CredentialStore, TenantDirectory, TokenService};
use academia_infra::{InMemoryCredentialStore, InMemoryDenylist, InMemoryTenantDirectory, LoggingNotifier};

#[cfg(feature = "postgres")]
use academia_infra::{PgCredentialStore, PgTenantDirectory};
#[cfg(feature = "postgres")]
use sqlx::postgres::PgPoolOptions;

use crate::config::ApiConfig;

/// Type-erased auth service shared by every handler.
pub type DynAuthService = AuthService<Arc<dyn TenantDirectory>, Arc<dyn CredentialStore>, Arc<dyn AuthNotifier>>;

pub struct AppServices {
    pub auth: DynAuthService,
}

impl AppServices {
    pub fn new(
        tenants: Arc<dyn TenantDirectory>,
        users: Arc<dyn CredentialStore>,
        notifier: Arc<dyn AuthNotifier>,
        tokens: TokenService,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let auth = AuthService::new(tenants, users, notifier, Arc::new(tokens), config)?;
        Ok(Self { auth })
    }
}

/// Build the production service graph from configuration.
///
/// Postgres is used when `DATABASE_URL` is set and the `postgres` feature is
/// enabled; otherwise storage is in-memory (empty, development only).
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let mut tokens = TokenService::new(&config.auth)?;
    if config.token_denylist {
        tracing::info!("access token denylist enabled");
        tokens = tokens.with_denylist(Arc::new(InMemoryDenylist::new()));
    }

    let (tenants, users) = build_stores(config).await?;
    let notifier: Arc<dyn AuthNotifier> = Arc::new(LoggingNotifier);

    Ok(AppServices::new(tenants, users, notifier, tokens, config.auth.clone())?)
}

type Stores = (Arc<dyn TenantDirectory>, Arc<dyn CredentialStore>);

#[cfg(feature = "postgres")]
async fn build_stores(config: &ApiConfig) -> anyhow::Result<Stores> {
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            tracing::info!(max_connections = config.database_max_connections, "connected to postgres");
            Ok((
                Arc::new(PgTenantDirectory::new(pool.clone())),
                Arc::new(PgCredentialStore::new(pool)),
            ))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_stores(config: &ApiConfig) -> anyhow::Result<Stores> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the postgres feature is disabled; ignoring");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> Stores {
    tracing::warn!("using in-memory tenant and credential storage; data is not persisted");
    (
        Arc::new(InMemoryTenantDirectory::new()),
        Arc::new(InMemoryCredentialStore::new()),
    )
}
