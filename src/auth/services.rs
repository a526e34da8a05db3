use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use super::{
    dto::{LoginRequest, RegisterRequest},
    errors::AuthError,
    jwt::JwtKeys,
    password::{self, Argon2Hasher},
    repo::UserStore,
    repo_types::{NewUser, UniqueField, User},
};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration and login on top of a [`UserStore`].
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    hasher: Argon2Hasher,
    // Verified against on unknown-email logins so both failure paths pay for one Argon2 run.
    dummy_hash: String,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn UserStore>,
        keys: JwtKeys,
        hasher: Argon2Hasher,
    ) -> anyhow::Result<Self> {
        let dummy_hash = hasher.hash_password("unknown-account-placeholder")?;
        Ok(Self {
            store,
            keys,
            hasher,
            dummy_hash,
        })
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<(User, String), AuthError> {
        let email = req.email.trim().to_string();
        validate_registration(&email, &req.username, &req.password)?;

        if self.store.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::Conflict(UniqueField::Email));
        }
        if self.store.find_by_username(&req.username).await?.is_some() {
            warn!(username = %req.username, "username already taken");
            return Err(AuthError::Conflict(UniqueField::Username));
        }

        let hasher = self.hasher.clone();
        let plain = req.password;
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash_password(&plain))
            .await
            .map_err(|e| AuthError::Internal(e.into()))?
            .map_err(AuthError::Internal)?;

        let user = self
            .store
            .insert(NewUser {
                email,
                username: req.username,
                password_hash,
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "insert user failed");
                AuthError::from(e)
            })?;

        let token = self.issue_token(&user)?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok((user, token))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<(User, String), AuthError> {
        let email = req.email.trim();

        let Some(user) = self.store.find_by_email(email).await? else {
            let _ = verify_off_thread(req.password, self.dummy_hash.clone()).await?;
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let verified = verify_off_thread(req.password, user.password_hash.clone()).await?;
        match verified {
            Ok(true) => {}
            Ok(false) => {
                warn!(user_id = %user.id, "login invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, user_id = %user.id, "stored password hash unreadable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login on inactive account");
            return Err(AuthError::AccountInactive);
        }

        let token = self.issue_token(&user)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok((user, token))
    }

    fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        self.keys.sign(&user.email).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AuthError::Internal(e)
        })
    }
}

async fn verify_off_thread(
    plain: String,
    hash: String,
) -> Result<anyhow::Result<bool>, AuthError> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| AuthError::Internal(e.into()))
}

fn validate_registration(email: &str, username: &str, password: &str) -> Result<(), AuthError> {
    if !is_valid_email(email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }
    let username_len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
        return Err(AuthError::Validation(format!(
            "Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::memory::MemoryUserStore;
    use crate::config::JwtConfig;
    use jsonwebtoken::Algorithm;

    fn service() -> (CredentialService, MemoryUserStore) {
        let store = MemoryUserStore::default();
        let keys = JwtKeys::new(&JwtConfig {
            secret: "test-secret".into(),
            algorithm: Algorithm::HS256,
            ttl_minutes: 30,
        });
        let svc = CredentialService::new(Arc::new(store.clone()), keys, password::test_hasher())
            .expect("service builds");
        (svc, store)
    }

    fn register_req(email: &str, username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn register_creates_active_user_with_token() {
        let (svc, store) = service();
        let (user, token) = svc
            .register(register_req("a@x.com", "alice", "password123"))
            .await
            .expect("register");

        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.username, "alice");
        assert!(user.is_active);
        assert!(!token.is_empty());
        assert_eq!(store.count_by_email("a@x.com"), 1);

        let stored = store.get("a@x.com").unwrap();
        assert!(!stored.password_hash.is_empty());
        assert_ne!(stored.password_hash, "password123");
        assert!(password::verify_password("password123", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn register_token_subject_is_email() {
        let (svc, _) = service();
        let (_, token) = svc
            .register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();
        let claims = svc.keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
    }

    #[tokio::test]
    async fn register_duplicate_email_conflicts() {
        let (svc, store) = service();
        svc.register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();
        let err = svc
            .register(register_req("a@x.com", "bob", "other1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(UniqueField::Email)));
        assert_eq!(store.count_by_email("a@x.com"), 1);
    }

    #[tokio::test]
    async fn register_duplicate_username_conflicts() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();
        let err = svc
            .register(register_req("b@x.com", "alice", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(UniqueField::Username)));
    }

    #[tokio::test]
    async fn concurrent_registrations_only_one_wins() {
        let (svc, store) = service();
        let svc = Arc::new(svc);
        let a = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.register(register_req("race@x.com", "racer1", "password123"))
                    .await
            })
        };
        let b = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.register(register_req("race@x.com", "racer2", "password123"))
                    .await
            })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::Conflict(UniqueField::Email)))));
        assert_eq!(store.count_by_email("race@x.com"), 1);
    }

    #[tokio::test]
    async fn register_validation_happens_before_store_access() {
        let (svc, store) = service();
        for req in [
            register_req("not-an-email", "alice", "password123"),
            register_req("a@x.com", "al", "password123"),
            register_req("a@x.com", &"x".repeat(51), "password123"),
            register_req("a@x.com", "alice", "short"),
        ] {
            let err = svc.register(req).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "got {err:?}");
        }
        assert_eq!(store.count_by_email("a@x.com"), 0);
    }

    #[tokio::test]
    async fn username_bounds_are_inclusive() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "abc", "password123"))
            .await
            .unwrap();
        svc.register(register_req("b@x.com", &"y".repeat(50), "password123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn login_succeeds_with_correct_password() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();
        let (user, token) = svc.login(login_req("a@x.com", "password123")).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(svc.keys.verify(&token).unwrap().sub, "a@x.com");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();

        let wrong = svc.login(login_req("a@x.com", "wrongpass")).await.unwrap_err();
        let unknown = svc
            .login(login_req("nobody@x.com", "password123"))
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status_code(), unknown.status_code());
    }

    #[tokio::test]
    async fn unknown_email_path_checks_against_placeholder_hash() {
        let (svc, _) = service();
        assert!(svc.dummy_hash.contains("m=1024,t=1,p=1"));
        assert!(!password::verify_password("password123", &svc.dummy_hash).unwrap());

        let err = svc
            .login(login_req("nobody@x.com", "unknown-account-placeholder"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn inactive_account_is_rejected_after_password_check() {
        let (svc, store) = service();
        svc.register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();
        store.set_active("a@x.com", false);

        let err = svc.login(login_req("a@x.com", "password123")).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));

        let err = svc.login(login_req("a@x.com", "wrongpass")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_does_not_mutate_user() {
        let (svc, store) = service();
        svc.register(register_req("a@x.com", "alice", "password123"))
            .await
            .unwrap();
        let before = store.get("a@x.com").unwrap();
        svc.login(login_req("a@x.com", "password123")).await.unwrap();
        let after = store.get("a@x.com").unwrap();
        assert_eq!(before.password_hash, after.password_hash);
        assert_eq!(before.created_at, after.created_at);
        assert!(after.is_active);
    }
}
