//! Outbound delivery of verification and reset tokens.
//!
//! Real email/SMS delivery is an external collaborator. [`LoggingNotifier`]
//! records that a delivery happened without the token itself;
//! [`OutboxNotifier`] keeps deliveries in memory so dev setups and tests can
//! read them back.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use academia_auth::{AuthNotifier, StoreError, Tenant, User};
use academia_core::{TenantId, UserId};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl AuthNotifier for LoggingNotifier {
    async fn send_email_verification(&self, tenant: &Tenant, user: &User, _token: &str) -> Result<(), StoreError> {
        tracing::info!(tenant_id = %tenant.id, user_id = %user.id, "email verification dispatched");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        tenant: &Tenant,
        user: &User,
        _token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tracing::info!(
            tenant_id = %tenant.id,
            user_id = %user.id,
            expires_at = %expires_at,
            "password reset dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    EmailVerification,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub token: String,
}

/// In-memory outbox.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent token of `kind` delivered to `email`.
    pub fn latest_token(&self, kind: NotificationKind, email: &str) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        sent.iter()
            .rev()
            .find(|n| n.kind == kind && n.email == email)
            .map(|n| n.token.clone())
    }

    fn push(&self, kind: NotificationKind, user: &User, token: &str) -> Result<(), StoreError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| StoreError::Unavailable("outbox lock poisoned".to_string()))?;
        sent.push(Notification {
            kind,
            tenant_id: user.tenant_id,
            user_id: user.id,
            email: user.email.clone(),
            token: token.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl AuthNotifier for OutboxNotifier {
    async fn send_email_verification(&self, _tenant: &Tenant, user: &User, token: &str) -> Result<(), StoreError> {
        self.push(NotificationKind::EmailVerification, user, token)
    }

    async fn send_password_reset(
        &self,
        _tenant: &Tenant,
        user: &User,
        token: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.push(NotificationKind::PasswordReset, user, token)
    }
}
