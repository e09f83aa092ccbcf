//! Tenant (academy) record as seen by the authentication core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use academia_core::TenantId;

use crate::error::AuthError;

/// Subscription plan of a tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicensePlan {
    Trial,
    Basic,
    Premium,
    Enterprise,
}

impl LicensePlan {
    pub fn as_str(self) -> &'static str {
        match self {
            LicensePlan::Trial => "trial",
            LicensePlan::Basic => "basic",
            LicensePlan::Premium => "premium",
            LicensePlan::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(LicensePlan::Trial),
            "basic" => Some(LicensePlan::Basic),
            "premium" => Some(LicensePlan::Premium),
            "enterprise" => Some(LicensePlan::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A tenant. The domain is globally unique and never changes once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub domain: String,
    pub name: String,
    pub license_plan: LicensePlan,
    pub license_start: DateTime<Utc>,
    /// Exclusive end of the license window.
    pub license_end: DateTime<Utc>,
    pub active: bool,
    pub contact: ContactInfo,
}

impl Tenant {
    pub fn is_active_and_licensed(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.license_end
    }

    /// Pre-authentication gate: inactive tenants are reported before expired ones.
    pub fn gate(&self, now: DateTime<Utc>) -> Result<(), AuthError> {
        if !self.active {
            return Err(AuthError::TenantInactive);
        }
        if now >= self.license_end {
            return Err(AuthError::LicenseExpired);
        }
        Ok(())
    }
}

/// Canonical form used for domain lookups.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tenant(active: bool, license_end: DateTime<Utc>) -> Tenant {
        Tenant {
            id: TenantId::new(),
            domain: "gym1".into(),
            name: "Gym One".into(),
            license_plan: LicensePlan::Basic,
            license_start: license_end - Duration::days(365),
            license_end,
            active,
            contact: ContactInfo::default(),
        }
    }

    #[test]
    fn usable_only_when_active_and_inside_window() {
        let now = Utc::now();
        assert!(tenant(true, now + Duration::days(1)).is_active_and_licensed(now));
        assert!(!tenant(false, now + Duration::days(1)).is_active_and_licensed(now));
        assert!(!tenant(true, now - Duration::days(1)).is_active_and_licensed(now));
    }

    #[test]
    fn license_end_is_exclusive() {
        let now = Utc::now();
        let t = tenant(true, now);
        assert!(!t.is_active_and_licensed(now));
        assert_eq!(t.gate(now), Err(AuthError::LicenseExpired));
    }

    #[test]
    fn inactive_reported_before_expired() {
        let now = Utc::now();
        let t = tenant(false, now - Duration::days(1));
        assert_eq!(t.gate(now), Err(AuthError::TenantInactive));
    }

    #[test]
    fn domains_are_normalized() {
        assert_eq!(normalize_domain("  Gym1.Example "), "gym1.example");
    }
}
