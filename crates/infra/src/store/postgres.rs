//! Postgres-backed tenant directory and credential store.
//!
//! ## Tenant Isolation
//!
//! Every scoped operation:
//! 1. runs [`TenantScope::admit`] against the explicit tenant argument,
//! 2. opens a transaction and sets `app.current_tenant` with
//!    `set_config(.., true)` (transaction-local, gone at commit/rollback),
//! 3. carries `WHERE tenant_id = $1` in every statement.
//!
//! The `users` table is expected to have row-level security enabled with a
//! policy on `tenant_id = current_setting('app.current_tenant')::uuid`, so a
//! statement that lost its explicit filter still sees only its own tenant.
//!
//! Token lookups happen before any tenant is known. They go through two
//! `SECURITY DEFINER` functions that return only `(user_id, tenant_id)`:
//!
//! - `auth_locate_by_verification_token(token text)`
//! - `auth_locate_by_reset_token(token text, now timestamptz)`
//!
//! The row itself is then re-read inside its own tenant scope.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed / Io / other | N/A | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use academia_auth::{
    ContactInfo, CredentialStore, LicensePlan, NewUser, Role, StoreError, Tenant, TenantDirectory, TenantScope,
    User, UserLocator, UserStatus, normalize_domain, normalize_email,
};
use academia_core::{BranchId, TenantId, UserId};

macro_rules! select_users {
    ($tail:literal) => {
        concat!(
            "SELECT id, tenant_id, email, password_hash, first_name, last_name, phone, role, status, ",
            "branch_id, email_verified, email_verification_token, password_reset_token, ",
            "password_reset_expires_at, last_login_at, created_at, updated_at FROM users ",
            $tail
        )
    };
}

/// Postgres tenant directory. Tenants are global records; no row policy.
#[derive(Debug, Clone)]
pub struct PgTenantDirectory {
    pool: Arc<PgPool>,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    #[instrument(skip(self), err)]
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, domain, name, license_plan, license_start, license_end, active,
                   contact_name, contact_email, contact_phone
            FROM tenants
            WHERE domain = $1
            "#,
        )
        .bind(normalize_domain(domain))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_tenant_by_domain", e))?;

        row.map(|r| {
            let row = TenantRow::from_row(&r).map_err(|e| map_sqlx_error("decode_tenant", e))?;
            Tenant::try_from(row)
        })
        .transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, domain, name, license_plan, license_start, license_end, active,
                   contact_name, contact_email, contact_phone
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_tenant_by_id", e))?;

        row.map(|r| {
            let row = TenantRow::from_row(&r).map_err(|e| map_sqlx_error("decode_tenant", e))?;
            Tenant::try_from(row)
        })
        .transpose()
    }
}

/// Postgres credential store with two-layer tenant isolation.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: Arc<PgPool>,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Admit the explicit tenant, open a transaction and bind the row policy.
    async fn begin_scoped(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        scope.admit(tenant_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('app.current_tenant', $1, true)")
            .bind(scope.tenant_id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_current_tenant", e))?;

        Ok(tx)
    }

    async fn fetch_user(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
        operation: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut tx = self.begin_scoped(scope, tenant_id).await?;
        let row = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user: User = UserRow::from_row(&row)
            .map_err(|e| map_sqlx_error("decode_user", e))?
            .try_into()?;
        if !scope.permits(user.tenant_id) {
            tracing::error!(tenant_id = %tenant_id, row_tenant = %user.tenant_id, "row outside scope returned");
            return Err(StoreError::ScopeViolation);
        }
        Ok(Some(user))
    }

    /// Run one UPDATE in the tenant scope; zero affected rows is `NotFound`.
    async fn execute_update(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
        operation: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped(scope, tenant_id).await?;
        let result = query
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn locate(
        &self,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
        operation: &str,
    ) -> Result<Option<UserLocator>, StoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        row.map(|r| {
            let user_id: uuid::Uuid = r.try_get("user_id").map_err(|e| map_sqlx_error(operation, e))?;
            let tenant_id: uuid::Uuid = r.try_get("tenant_id").map_err(|e| map_sqlx_error(operation, e))?;
            Ok(UserLocator {
                user_id: UserId::from_uuid(user_id),
                tenant_id: TenantId::from_uuid(tenant_id),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self, scope, email), fields(tenant_id = %tenant_id), err)]
    async fn find_by_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = sqlx::query(select_users!("WHERE tenant_id = $1 AND email = $2"))
            .bind(tenant_id.as_uuid())
            .bind(normalize_email(email));
        self.fetch_user(scope, tenant_id, query, "find_user_by_email").await
    }

    #[instrument(skip(self, scope), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn find_by_id(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<User>, StoreError> {
        let query = sqlx::query(select_users!("WHERE tenant_id = $1 AND id = $2"))
            .bind(tenant_id.as_uuid())
            .bind(user_id.as_uuid());
        self.fetch_user(scope, tenant_id, query, "find_user_by_id").await
    }

    #[instrument(skip_all, err)]
    async fn locate_by_email_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<UserLocator>, StoreError> {
        let query = sqlx::query("SELECT user_id, tenant_id FROM auth_locate_by_verification_token($1)").bind(token);
        self.locate(query, "locate_by_verification_token").await
    }

    #[instrument(skip_all, err)]
    async fn locate_by_password_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserLocator>, StoreError> {
        let query = sqlx::query("SELECT user_id, tenant_id FROM auth_locate_by_reset_token($1, $2)")
            .bind(token)
            .bind(now);
        self.locate(query, "locate_by_reset_token").await
    }

    #[instrument(skip(self, scope, user, now), fields(tenant_id = %user.tenant_id, user_id = %user.id), err)]
    async fn create(&self, scope: &TenantScope, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let user = User::from_new(user, now);
        let mut tx = self.begin_scoped(scope, user.tenant_id).await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, tenant_id, email, password_hash, first_name, last_name, phone, role, status,
                branch_id, email_verified, email_verification_token, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.tenant_id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.branch_id.map(|b| *b.as_uuid()))
        .bind(user.email_verified)
        .bind(&user.email_verification_token)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    #[instrument(skip(self, scope, password_hash, now), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn update_password_hash(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3,
                password_reset_token = NULL,
                password_reset_expires_at = NULL,
                updated_at = $4
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(password_hash)
        .bind(now);
        self.execute_update(scope, tenant_id, query, "update_password_hash").await
    }

    #[instrument(skip(self, scope, token, password_hash, now), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn consume_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // A concurrent redemption re-evaluates the WHERE after the first
        // commit and matches nothing.
        let query = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $4,
                password_reset_token = NULL,
                password_reset_expires_at = NULL,
                updated_at = $5
            WHERE tenant_id = $1 AND id = $2
              AND password_reset_token = $3
              AND password_reset_expires_at > $5
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(token)
        .bind(password_hash)
        .bind(now);
        self.execute_update(scope, tenant_id, query, "consume_reset_token").await
    }

    #[instrument(skip(self, scope, token), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn set_verification_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            "UPDATE users SET email_verification_token = $3, updated_at = NOW() WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(token);
        self.execute_update(scope, tenant_id, query, "set_verification_token").await
    }

    #[instrument(skip(self, scope, token), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn set_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = $3, password_reset_expires_at = $4, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(token)
        .bind(expires_at);
        self.execute_update(scope, tenant_id, query, "set_reset_token").await
    }

    #[instrument(skip(self, scope), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn clear_reset_token(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = NULL, password_reset_expires_at = NULL, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid());
        self.execute_update(scope, tenant_id, query, "clear_reset_token").await
    }

    #[instrument(skip(self, scope, token), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn verify_email(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = TRUE,
                email_verification_token = NULL,
                status = CASE WHEN status = 'pending' THEN 'active' ELSE status END,
                updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2 AND email_verification_token = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(token);
        self.execute_update(scope, tenant_id, query, "verify_email").await
    }

    #[instrument(skip(self, scope), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn update_status(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        status: UserStatus,
    ) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE users SET status = $3, updated_at = NOW() WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(status.as_str());
        self.execute_update(scope, tenant_id, query, "update_status").await
    }

    #[instrument(skip(self, scope), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn update_last_login(
        &self,
        scope: &TenantScope,
        tenant_id: TenantId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE users SET last_login_at = $3, updated_at = $3 WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(at);
        self.execute_update(scope, tenant_id, query, "update_last_login").await
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict;
            }
            StoreError::Unavailable(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {}", operation)),
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(what: &str, value: &str) -> StoreError {
    StoreError::Unavailable(format!("unknown {} in storage: {}", what, value))
}

// SQLx row types

#[derive(Debug)]
struct TenantRow {
    id: uuid::Uuid,
    domain: String,
    name: String,
    license_plan: String,
    license_start: DateTime<Utc>,
    license_end: DateTime<Utc>,
    active: bool,
    contact_name: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TenantRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TenantRow {
            id: row.try_get("id")?,
            domain: row.try_get("domain")?,
            name: row.try_get("name")?,
            license_plan: row.try_get("license_plan")?,
            license_start: row.try_get("license_start")?,
            license_end: row.try_get("license_end")?,
            active: row.try_get("active")?,
            contact_name: row.try_get("contact_name")?,
            contact_email: row.try_get("contact_email")?,
            contact_phone: row.try_get("contact_phone")?,
        })
    }
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let license_plan =
            LicensePlan::parse(&row.license_plan).ok_or_else(|| decode_error("license plan", &row.license_plan))?;
        Ok(Tenant {
            id: TenantId::from_uuid(row.id),
            domain: row.domain,
            name: row.name,
            license_plan,
            license_start: row.license_start,
            license_end: row.license_end,
            active: row.active,
            contact: ContactInfo {
                name: row.contact_name,
                email: row.contact_email,
                phone: row.contact_phone,
            },
        })
    }
}

#[derive(Debug)]
struct UserRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: String,
    status: String,
    branch_id: Option<uuid::Uuid>,
    email_verified: bool,
    email_verification_token: Option<String>,
    password_reset_token: Option<String>,
    password_reset_expires_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
            role: row.try_get("role")?,
            status: row.try_get("status")?,
            branch_id: row.try_get("branch_id")?,
            email_verified: row.try_get("email_verified")?,
            email_verification_token: row.try_get("email_verification_token")?,
            password_reset_token: row.try_get("password_reset_token")?,
            password_reset_expires_at: row.try_get("password_reset_expires_at")?,
            last_login_at: row.try_get("last_login_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(|_| decode_error("role", &row.role))?;
        let status = UserStatus::parse(&row.status).ok_or_else(|| decode_error("status", &row.status))?;
        Ok(User {
            id: UserId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            role,
            status,
            branch_id: row.branch_id.map(BranchId::from_uuid),
            email_verified: row.email_verified,
            email_verification_token: row.email_verification_token,
            password_reset_token: row.password_reset_token,
            password_reset_expires_at: row.password_reset_expires_at,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
