//! Integration tests for the full authentication pipeline.
//!
//! Tests: AuthService → TenantDirectory / CredentialStore → TokenService
//!
//! Verifies:
//! - Login succeeds only for an active user of an active, licensed tenant
//! - Token lifecycles (refresh, reset, verification) are single-purpose
//! - Tenant isolation is preserved when emails collide across tenants

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use academia_auth::{
        AccessClaims, AuthConfig, AuthError, AuthService, ContactInfo, CredentialStore, LicensePlan, LoginInput,
        NewUser, PasswordHasher, PasswordParams, Principal, RegisterInput, Role, Tenant, TenantScope, TokenService,
        User, UserStatus,
    };
    use academia_core::{TenantId, UserId};

    use crate::denylist::InMemoryDenylist;
    use crate::notifier::{NotificationKind, OutboxNotifier};
    use crate::store::{InMemoryCredentialStore, InMemoryTenantDirectory};

    type Service = AuthService<Arc<InMemoryTenantDirectory>, Arc<InMemoryCredentialStore>, Arc<OutboxNotifier>>;

    const COACH_PASSWORD: &str = "P1";

    fn cheap_params() -> PasswordParams {
        PasswordParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn config() -> AuthConfig {
        AuthConfig {
            access_token_secret: "access-secret-for-tests".into(),
            refresh_token_secret: "refresh-secret-for-tests".into(),
            password_params: cheap_params(),
            ..AuthConfig::default()
        }
    }

    fn tenant(domain: &str, active: bool, license_end: DateTime<Utc>) -> Tenant {
        Tenant {
            id: TenantId::new(),
            domain: domain.into(),
            name: format!("Academy {domain}"),
            license_plan: LicensePlan::Premium,
            license_start: license_end - Duration::days(365),
            license_end,
            active,
            contact: ContactInfo::default(),
        }
    }

    struct Fixture {
        service: Service,
        users: Arc<InMemoryCredentialStore>,
        outbox: Arc<OutboxNotifier>,
        hasher: PasswordHasher,
        gym1: Tenant,
    }

    impl Fixture {
        fn new() -> Self {
            Self::build(None)
        }

        fn with_denylist(denylist: Arc<InMemoryDenylist>) -> Self {
            Self::build(Some(denylist))
        }

        fn build(denylist: Option<Arc<InMemoryDenylist>>) -> Self {
            let now = Utc::now();
            let tenants = Arc::new(InMemoryTenantDirectory::new());
            let gym1 = tenant("gym1", true, now + Duration::days(30));
            tenants.insert(gym1.clone()).unwrap();
            tenants.insert(tenant("gym2", true, now - Duration::days(1))).unwrap();
            tenants.insert(tenant("closed", false, now + Duration::days(30))).unwrap();

            let users = Arc::new(InMemoryCredentialStore::new());
            let outbox = Arc::new(OutboxNotifier::new());
            let config = config();
            let mut tokens = TokenService::new(&config).unwrap();
            if let Some(denylist) = denylist {
                tokens = tokens.with_denylist(denylist);
            }
            let service = AuthService::new(
                tenants.clone(),
                users.clone(),
                outbox.clone(),
                Arc::new(tokens),
                config,
            )
            .unwrap();

            let fx = Self {
                service,
                users,
                outbox,
                hasher: PasswordHasher::new(cheap_params()).unwrap(),
                gym1,
            };
            fx.seed(fx.gym1.id, "coach@gym1", COACH_PASSWORD, Role::Coach, UserStatus::Active);
            fx
        }

        fn seed(&self, tenant_id: TenantId, email: &str, password: &str, role: Role, status: UserStatus) -> User {
            let mut user = User::from_new(
                NewUser {
                    id: UserId::new(),
                    tenant_id,
                    email: email.into(),
                    password_hash: self.hasher.hash(password).unwrap(),
                    first_name: "Test".into(),
                    last_name: "User".into(),
                    phone: None,
                    role,
                    status,
                    branch_id: None,
                    email_verification_token: None,
                },
                Utc::now(),
            );
            user.email_verified = status == UserStatus::Active;
            self.users.insert(user.clone()).unwrap();
            user
        }

        async fn stored(&self, user: &User) -> User {
            let scope = TenantScope::bind(user.tenant_id);
            self.users
                .find_by_id(&scope, user.tenant_id, user.id)
                .await
                .unwrap()
                .unwrap()
        }
    }

    fn login_input(email: &str, password: &str, domain: &str) -> LoginInput {
        LoginInput {
            email: email.into(),
            password: password.into(),
            tenant_domain: domain.into(),
        }
    }

    fn register_input(email: &str, role: Role) -> RegisterInput {
        RegisterInput {
            email: email.into(),
            password: "long-enough-password".into(),
            first_name: "New".into(),
            last_name: "Student".into(),
            phone: Some("  ".into()),
            role,
            tenant_domain: "gym1".into(),
            branch_id: None,
        }
    }

    #[tokio::test]
    async fn coach_logs_into_gym1() {
        let fx = Fixture::new();
        let now = Utc::now();

        let session = fx
            .service
            .login(login_input(" Coach@Gym1 ", COACH_PASSWORD, "GYM1"), now)
            .await
            .unwrap();

        let tokens = session.tokens.expect("login always issues tokens");
        assert!(!tokens.access_token.is_empty());
        assert!(!tokens.refresh_token.is_empty());
        assert_eq!(session.tenant.id, fx.gym1.id);
        assert_eq!(session.user.last_login_at, Some(now));

        let claims = fx.service.authenticate(&tokens.access_token, now).unwrap();
        assert_eq!(claims.tenant_id, fx.gym1.id);
        assert_eq!(claims.role, Role::Coach);
        assert_eq!(claims.email, "coach@gym1");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let fx = Fixture::new();
        let now = Utc::now();

        let wrong_password = fx
            .service
            .login(login_input("coach@gym1", "nope", "gym1"), now)
            .await
            .unwrap_err();
        let unknown_email = fx
            .service
            .login(login_input("ghost@gym1", COACH_PASSWORD, "gym1"), now)
            .await
            .unwrap_err();

        assert_eq!(wrong_password, AuthError::InvalidCredentials);
        assert_eq!(wrong_password, unknown_email);
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn tenant_gates_run_before_credentials() {
        let fx = Fixture::new();
        let now = Utc::now();

        let err = fx
            .service
            .login(login_input("anyone@gym2", "whatever", "gym2"), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::LicenseExpired);

        let err = fx
            .service
            .login(login_input("anyone@closed", "whatever", "closed"), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TenantInactive);

        let err = fx
            .service
            .login(login_input("coach@gym1", COACH_PASSWORD, "nowhere"), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TenantNotFound);
    }

    #[tokio::test]
    async fn account_status_gates_login() {
        let fx = Fixture::new();
        let now = Utc::now();
        fx.seed(fx.gym1.id, "suspended@gym1", "pw", Role::Student, UserStatus::Suspended);
        fx.seed(fx.gym1.id, "inactive@gym1", "pw", Role::Student, UserStatus::Inactive);
        fx.seed(fx.gym1.id, "pending@gym1", "pw", Role::Student, UserStatus::Pending);

        for (email, expected) in [
            ("suspended@gym1", AuthError::AccountSuspended),
            ("inactive@gym1", AuthError::AccountInactive),
            ("pending@gym1", AuthError::AccountPending),
        ] {
            let err = fx.service.login(login_input(email, "pw", "gym1"), now).await.unwrap_err();
            assert_eq!(err, expected, "{email}");
        }
    }

    #[tokio::test]
    async fn shared_email_never_crosses_tenants() {
        let fx = Fixture::new();
        let now = Utc::now();
        let gym3 = tenant("gym3", true, now + Duration::days(30));
        // Same email, different tenants, different passwords.
        let a = fx.seed(fx.gym1.id, "shared@mail", "password-a", Role::Student, UserStatus::Active);
        let b = fx.seed(gym3.id, "shared@mail", "password-b", Role::Student, UserStatus::Active);

        let err = fx
            .service
            .login(login_input("shared@mail", "password-b", "gym1"), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);

        let session = fx
            .service
            .login(login_input("shared@mail", "password-a", "gym1"), now)
            .await
            .unwrap();
        assert_eq!(session.user.id, a.id);
        assert_ne!(session.user.id, b.id);

        let scope = TenantScope::bind(fx.gym1.id);
        let found = fx
            .users
            .find_by_email(&scope, fx.gym1.id, "shared@mail")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tenant_id, fx.gym1.id);
    }

    #[tokio::test]
    async fn registration_creates_pending_user_and_sends_verification() {
        let fx = Fixture::new();
        let now = Utc::now();

        let session = fx
            .service
            .register(register_input("New@Gym1", Role::Student), now)
            .await
            .unwrap();
        assert_eq!(session.user.email, "new@gym1");
        assert_eq!(session.user.status, UserStatus::Pending);
        assert_eq!(session.user.phone, None);
        assert!(!session.user.email_verified);
        assert!(session.tokens.is_some());

        let token = fx
            .outbox
            .latest_token(NotificationKind::EmailVerification, "new@gym1")
            .expect("verification dispatched");

        let err = fx
            .service
            .login(login_input("new@gym1", "long-enough-password", "gym1"), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AccountPending);

        fx.service.verify_email(&token).await.unwrap();
        assert_eq!(fx.service.verify_email(&token).await, Err(AuthError::InvalidToken));

        let session = fx
            .service
            .login(login_input("new@gym1", "long-enough-password", "gym1"), now)
            .await
            .unwrap();
        assert_eq!(session.user.status, UserStatus::Active);
        assert!(session.user.email_verified);
    }

    #[tokio::test]
    async fn registration_rejects_duplicates_escalation_and_bad_input() {
        let fx = Fixture::new();
        let now = Utc::now();

        let err = fx
            .service
            .register(register_input("coach@gym1", Role::Student), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UserExists);

        let err = fx
            .service
            .register(register_input("boss@gym1", Role::SystemManager), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InsufficientPermissions);

        let mut bad = register_input("not-an-email", Role::Student);
        bad.password = "short".into();
        bad.first_name = " ".into();
        match fx.service.register(bad, now).await.unwrap_err() {
            AuthError::Validation(fields) => {
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("password"));
                assert!(fields.contains_key("firstName"));
                assert!(!fields.contains_key("lastName"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut expired = register_input("late@gym2", Role::Student);
        expired.tenant_domain = "gym2".into();
        assert_eq!(
            fx.service.register(expired, now).await.unwrap_err(),
            AuthError::LicenseExpired
        );
    }

    #[tokio::test]
    async fn registration_can_skip_auto_authentication() {
        let tenants = Arc::new(InMemoryTenantDirectory::new());
        tenants
            .insert(tenant("gym1", true, Utc::now() + Duration::days(30)))
            .unwrap();
        let config = AuthConfig {
            issue_tokens_on_register: false,
            ..config()
        };
        let tokens = Arc::new(TokenService::new(&config).unwrap());
        let service = AuthService::new(
            tenants,
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(OutboxNotifier::new()),
            tokens,
            config,
        )
        .unwrap();

        let session = service
            .register(register_input("quiet@gym1", Role::Student), Utc::now())
            .await
            .unwrap();
        assert!(session.tokens.is_none());
    }

    #[tokio::test]
    async fn password_reset_round_trip_is_single_use() {
        let fx = Fixture::new();
        let now = Utc::now();

        fx.service
            .request_password_reset("coach@gym1", "gym1", now)
            .await
            .unwrap();
        let token = fx
            .outbox
            .latest_token(NotificationKind::PasswordReset, "coach@gym1")
            .unwrap();

        fx.service
            .reset_password(&token, "brand-new-password", now)
            .await
            .unwrap();

        fx.service
            .login(login_input("coach@gym1", "brand-new-password", "gym1"), now)
            .await
            .unwrap();
        assert_eq!(
            fx.service
                .login(login_input("coach@gym1", COACH_PASSWORD, "gym1"), now)
                .await
                .unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            fx.service.reset_password(&token, "another-password", now).await,
            Err(AuthError::InvalidOrExpiredToken)
        );
    }

    #[tokio::test]
    async fn reset_token_expires_after_an_hour() {
        let fx = Fixture::new();
        let now = Utc::now();

        fx.service
            .request_password_reset("coach@gym1", "gym1", now)
            .await
            .unwrap();
        let token = fx
            .outbox
            .latest_token(NotificationKind::PasswordReset, "coach@gym1")
            .unwrap();

        let later = now + Duration::seconds(3600);
        assert_eq!(
            fx.service.reset_password(&token, "brand-new-password", later).await,
            Err(AuthError::InvalidOrExpiredToken)
        );
    }

    #[tokio::test]
    async fn newer_reset_request_overwrites_older_token() {
        let fx = Fixture::new();
        let now = Utc::now();

        fx.service.request_password_reset("coach@gym1", "gym1", now).await.unwrap();
        let first = fx.outbox.latest_token(NotificationKind::PasswordReset, "coach@gym1").unwrap();
        fx.service.request_password_reset("coach@gym1", "gym1", now).await.unwrap();
        let second = fx.outbox.latest_token(NotificationKind::PasswordReset, "coach@gym1").unwrap();

        assert_ne!(first, second);
        assert_eq!(
            fx.service.reset_password(&first, "brand-new-password", now).await,
            Err(AuthError::InvalidOrExpiredToken)
        );
        fx.service.reset_password(&second, "brand-new-password", now).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_resets_with_one_token_succeed_once() {
        let fx = Fixture::new();
        let now = Utc::now();

        fx.service.request_password_reset("coach@gym1", "gym1", now).await.unwrap();
        let token = fx.outbox.latest_token(NotificationKind::PasswordReset, "coach@gym1").unwrap();

        let (a, b) = tokio::join!(
            fx.service.reset_password(&token, "first-new-password", now),
            fx.service.reset_password(&token, "second-new-password", now),
        );

        let (winner, loser) = match (&a, &b) {
            (Ok(()), Err(_)) => ("first-new-password", &b),
            (Err(_), Ok(())) => ("second-new-password", &a),
            _ => panic!("expected exactly one successful reset, got {a:?} and {b:?}"),
        };
        assert_eq!(loser, &Err(AuthError::InvalidOrExpiredToken));

        fx.service
            .login(login_input("coach@gym1", winner, "gym1"), now)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_email_verifications_succeed_once() {
        let fx = Fixture::new();
        let now = Utc::now();

        fx.service
            .register(register_input("twice@gym1", Role::Student), now)
            .await
            .unwrap();
        let token = fx
            .outbox
            .latest_token(NotificationKind::EmailVerification, "twice@gym1")
            .unwrap();

        let (a, b) = tokio::join!(fx.service.verify_email(&token), fx.service.verify_email(&token));
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1, "{outcomes:?}");
        assert!(outcomes.contains(&Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn reset_request_is_silent_for_unknown_accounts() {
        let fx = Fixture::new();
        let now = Utc::now();

        fx.service.request_password_reset("ghost@gym1", "gym1", now).await.unwrap();
        fx.service.request_password_reset("coach@gym1", "nowhere", now).await.unwrap();
        assert!(fx.outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn refresh_reissues_with_current_state() {
        let fx = Fixture::new();
        let now = Utc::now();
        let student = fx.seed(fx.gym1.id, "student@gym1", "pw", Role::Student, UserStatus::Active);

        let session = fx
            .service
            .login(login_input("student@gym1", "pw", "gym1"), now)
            .await
            .unwrap();
        let tokens = session.tokens.unwrap();

        let later = now + Duration::minutes(5);
        let renewed = fx.service.refresh_token(&tokens.refresh_token, later).await.unwrap();
        let claims = fx.service.authenticate(&renewed.access_token, later).unwrap();
        assert_eq!(claims.sub, student.id);

        // An access token is not a refresh token.
        assert_eq!(
            fx.service.refresh_token(&tokens.access_token, later).await,
            Err(AuthError::InvalidOrExpiredToken)
        );

        // Past the refresh lifetime.
        let expired = now + Duration::days(31);
        assert_eq!(
            fx.service.refresh_token(&tokens.refresh_token, expired).await,
            Err(AuthError::InvalidOrExpiredToken)
        );

        let scope = TenantScope::bind(fx.gym1.id);
        fx.users
            .update_status(&scope, fx.gym1.id, student.id, UserStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(
            fx.service.refresh_token(&tokens.refresh_token, later).await,
            Err(AuthError::AccountSuspended)
        );
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let fx = Fixture::new();
        let now = Utc::now();
        let coach = fx.stored(&fx.seed(fx.gym1.id, "c2@gym1", "old-password", Role::Coach, UserStatus::Active)).await;
        let principal = Principal::from_user(&coach);

        assert_eq!(
            fx.service
                .change_password(&principal, "wrong-password", "new-password-1", now)
                .await,
            Err(AuthError::InvalidCredentials)
        );

        fx.service
            .change_password(&principal, "old-password", "new-password-1", now)
            .await
            .unwrap();
        fx.service
            .login(login_input("c2@gym1", "new-password-1", "gym1"), now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resend_verification_replaces_the_token() {
        let fx = Fixture::new();
        let now = Utc::now();
        fx.service
            .register(register_input("late@gym1", Role::Student), now)
            .await
            .unwrap();
        let first = fx
            .outbox
            .latest_token(NotificationKind::EmailVerification, "late@gym1")
            .unwrap();

        fx.service.resend_email_verification("late@gym1", "gym1").await.unwrap();
        let second = fx
            .outbox
            .latest_token(NotificationKind::EmailVerification, "late@gym1")
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(fx.service.verify_email(&first).await, Err(AuthError::InvalidToken));
        fx.service.verify_email(&second).await.unwrap();

        assert_eq!(
            fx.service.resend_email_verification("late@gym1", "gym1").await,
            Err(AuthError::AlreadyVerified)
        );
        fx.service.resend_email_verification("ghost@gym1", "gym1").await.unwrap();
    }

    #[tokio::test]
    async fn current_identity_reloads_user_and_tenant() {
        let fx = Fixture::new();
        let now = Utc::now();
        let session = fx
            .service
            .login(login_input("coach@gym1", COACH_PASSWORD, "gym1"), now)
            .await
            .unwrap();
        let claims = fx
            .service
            .authenticate(&session.tokens.unwrap().access_token, now)
            .unwrap();

        let identity = fx
            .service
            .current_identity(&Principal::from_claims(&claims))
            .await
            .unwrap();
        assert_eq!(identity.user.email, "coach@gym1");
        assert_eq!(identity.tenant.domain, "gym1");

        let ghost = Principal {
            user_id: UserId::new(),
            ..Principal::from_claims(&claims)
        };
        assert_eq!(fx.service.current_identity(&ghost).await.unwrap_err(), AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn logout_revokes_only_with_denylist() {
        let now = Utc::now();

        let fx = Fixture::new();
        let claims = login_claims(&fx, now).await;
        assert!(!fx.service.logout(&claims));

        let denylist = Arc::new(InMemoryDenylist::new());
        let fx = Fixture::with_denylist(denylist.clone());
        let session = fx
            .service
            .login(login_input("coach@gym1", COACH_PASSWORD, "gym1"), now)
            .await
            .unwrap();
        let access = session.tokens.unwrap().access_token;
        let claims = fx.service.authenticate(&access, now).unwrap();

        assert!(fx.service.logout(&claims));
        assert!(!denylist.is_empty());
        assert_eq!(fx.service.authenticate(&access, now), Err(AuthError::InvalidToken));
    }

    async fn login_claims(fx: &Fixture, now: DateTime<Utc>) -> AccessClaims {
        let session = fx
            .service
            .login(login_input("coach@gym1", COACH_PASSWORD, "gym1"), now)
            .await
            .unwrap();
        fx.service
            .authenticate(&session.tokens.unwrap().access_token, now)
            .unwrap()
    }
}
