//! In-memory `jti` denylist.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use academia_auth::TokenDenylist;

/// Revoked token ids, each kept until the token's own expiry.
#[derive(Debug, Default)]
pub struct InMemoryDenylist {
    revoked: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemoryDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.revoked.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenDenylist for InMemoryDenylist {
    fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>) -> bool {
        match self.revoked.write() {
            Ok(mut map) => {
                // Entries past their expiry can no longer match a valid token.
                map.retain(|_, exp| *exp > Utc::now());
                map.insert(jti, expires_at);
                true
            }
            Err(_) => {
                tracing::error!(jti = %jti, "denylist lock poisoned; token not revoked");
                false
            }
        }
    }

    fn is_revoked(&self, jti: &Uuid, now: DateTime<Utc>) -> bool {
        match self.revoked.read() {
            Ok(map) => map.get(jti).is_some_and(|exp| now < *exp),
            // Fail closed.
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn revoked_until_expiry() {
        let list = InMemoryDenylist::new();
        let jti = Uuid::new_v4();
        let now = Utc::now();
        assert!(list.revoke(jti, now + Duration::minutes(5)));

        assert!(list.is_revoked(&jti, now));
        assert!(!list.is_revoked(&Uuid::new_v4(), now));
        assert!(!list.is_revoked(&jti, now + Duration::minutes(5)));
    }

    #[test]
    fn poisoned_list_reports_failed_revocation_and_fails_closed() {
        let list = std::sync::Arc::new(InMemoryDenylist::new());
        let poisoner = list.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.revoked.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        let jti = Uuid::new_v4();
        assert!(!list.revoke(jti, Utc::now() + Duration::minutes(5)));
        assert!(list.is_revoked(&jti, Utc::now()));
    }

    #[test]
    fn expired_entries_are_pruned_on_write() {
        let list = InMemoryDenylist::new();
        list.revoke(Uuid::new_v4(), Utc::now() - Duration::minutes(1));
        list.revoke(Uuid::new_v4(), Utc::now() + Duration::minutes(1));
        assert_eq!(list.len(), 1);
    }
}
