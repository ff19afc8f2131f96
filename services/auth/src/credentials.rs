//! Credential verifier and registration
//!
//! Checks a submitted email/password against the stored hash. Every
//! failure is reported to the security log with a reason code, but the
//! caller-facing error for "no such email" and "wrong password" is the
//! same.

use chrono::Utc;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{error, info};

use crate::error::AuthError;
use crate::models::{HashedPassword, User, normalize_email};
use crate::password::PasswordHasher;
use crate::repositories::SharedUserStore;
use crate::security_log::{SecurityAction, SecurityEvent, SharedSecuritySink};
use crate::validation;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Invalid email or password")]
    NotFound,

    #[error("Account has been deactivated")]
    Inactive,

    #[error("Invalid email or password")]
    InvalidCredential,
}

impl CredentialError {
    pub fn code(self) -> &'static str {
        match self {
            CredentialError::NotFound | CredentialError::InvalidCredential => {
                "invalid_credentials"
            }
            CredentialError::Inactive => "account_inactive",
        }
    }

    /// Reason recorded in the security log; never sent to the client
    pub fn reason(self) -> &'static str {
        match self {
            CredentialError::NotFound => "email_not_found",
            CredentialError::Inactive => "account_inactive",
            CredentialError::InvalidCredential => "invalid_password",
        }
    }
}

/// Hash verified against when the email is unknown, so that path costs
/// the same argon2 work as a wrong password.
static DUMMY_HASH: OnceLock<Option<HashedPassword>> = OnceLock::new();

fn dummy_hash(hasher: &PasswordHasher) -> Option<&'static HashedPassword> {
    DUMMY_HASH
        .get_or_init(|| hasher.hash("unused-dummy-password").ok())
        .as_ref()
}

/// Registration input, before validation
#[derive(Clone)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Clone)]
pub struct CredentialVerifier {
    users: SharedUserStore,
    hasher: PasswordHasher,
    security_log: SharedSecuritySink,
}

impl CredentialVerifier {
    pub fn new(
        users: SharedUserStore,
        hasher: PasswordHasher,
        security_log: SharedSecuritySink,
    ) -> Self {
        Self {
            users,
            hasher,
            security_log,
        }
    }

    /// Look the user up by normalized email and check the password.
    pub async fn verify(
        &self,
        email: &str,
        password: &str,
        client: Option<&str>,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let user = self.users.find_by_email(&email).await?;

        match self.check(user, password) {
            Ok(user) => Ok(user),
            Err(failure) => {
                info!("Login failed for {}: {}", email, failure.reason());
                self.security_log.record(
                    SecurityEvent::new(SecurityAction::LoginFailed)
                        .email(email)
                        .client(client)
                        .reason(failure.reason()),
                );
                Err(failure.into())
            }
        }
    }

    fn check(&self, user: Option<User>, password: &str) -> Result<User, CredentialError> {
        let Some(user) = user else {
            if let Some(dummy) = dummy_hash(&self.hasher) {
                let _ = self.hasher.verify(password, dummy);
            }
            return Err(CredentialError::NotFound);
        };

        if !user.is_active {
            return Err(CredentialError::Inactive);
        }
        if user.password_hash.is_empty() {
            return Err(CredentialError::InvalidCredential);
        }

        match self.hasher.verify(password, &user.password_hash) {
            Ok(true) => Ok(user),
            Ok(false) => Err(CredentialError::InvalidCredential),
            Err(e) => {
                error!("Unusable password hash for user {}: {}", user.id, e);
                Err(CredentialError::InvalidCredential)
            }
        }
    }

    /// Validate input, hash the password and create a `user`-role account.
    pub async fn register(&self, registration: Registration<'_>) -> Result<User, AuthError> {
        validation::validate_name(registration.name).map_err(AuthError::Validation)?;
        validation::validate_email(registration.email).map_err(AuthError::Validation)?;
        validation::validate_password(registration.password).map_err(AuthError::Validation)?;

        let email = normalize_email(registration.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("Email is already in use".to_string()));
        }

        let password_hash = self.hasher.hash(registration.password)?;
        let user = User::register(registration.name, &email, password_hash, Utc::now());
        let user = self.users.create(&user).await?;

        info!("Registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryUserStore, UserStore};
    use crate::security_log::InMemorySecurityLog;
    use std::sync::Arc;

    struct Fixture {
        users: Arc<InMemoryUserStore>,
        log: Arc<InMemorySecurityLog>,
        verifier: CredentialVerifier,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserStore::new());
        let log = Arc::new(InMemorySecurityLog::new());
        let verifier = CredentialVerifier::new(users.clone(), PasswordHasher::new(), log.clone());
        Fixture {
            users,
            log,
            verifier,
        }
    }

    fn ann() -> Registration<'static> {
        Registration {
            name: "Ann",
            email: "ann@x.com",
            password: "secret1",
        }
    }

    #[tokio::test]
    async fn correct_password_returns_that_user() {
        let f = fixture();
        let registered = f.verifier.register(ann()).await.unwrap();

        let user = f
            .verifier
            .verify("  ANN@x.com ", "secret1", None)
            .await
            .unwrap();
        assert_eq!(user.id, registered.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_share_the_error() {
        let f = fixture();
        f.verifier.register(ann()).await.unwrap();

        let wrong = f.verifier.verify("ann@x.com", "nope", None).await.unwrap_err();
        let unknown = f
            .verifier
            .verify("bob@x.com", "secret1", None)
            .await
            .unwrap_err();

        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.code(), unknown.code());
        assert_eq!(wrong.status(), unknown.status());

        let reasons: Vec<_> = f.log.events().iter().map(|e| e.reason).collect();
        assert_eq!(reasons, vec![Some("invalid_password"), Some("email_not_found")]);
    }

    #[test]
    fn unknown_email_still_runs_a_hash_check() {
        let hasher = PasswordHasher::new();
        let dummy = dummy_hash(&hasher).expect("dummy hash is available");

        assert!(dummy.as_str().starts_with("$argon2"));
        assert!(matches!(hasher.verify("secret1", dummy), Ok(false)));
        assert!(std::ptr::eq(dummy, dummy_hash(&hasher).unwrap()));
    }

    #[tokio::test]
    async fn inactive_account_is_refused() {
        let f = fixture();
        let mut user = f.verifier.register(ann()).await.unwrap();
        user.is_active = false;
        f.users.update(&user).await.unwrap();

        let err = f.verifier.verify("ann@x.com", "secret1", None).await.unwrap_err();
        assert!(matches!(err, AuthError::Credential(CredentialError::Inactive)));
    }

    #[tokio::test]
    async fn empty_stored_hash_is_invalid() {
        let f = fixture();
        let mut user = f.verifier.register(ann()).await.unwrap();
        user.password_hash = crate::models::HashedPassword::from_stored("");
        f.users.update(&user).await.unwrap();

        let err = f.verifier.verify("ann@x.com", "secret1", None).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Credential(CredentialError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn registration_hashes_and_rejects_duplicates() {
        let f = fixture();
        let user = f.verifier.register(ann()).await.unwrap();
        assert_ne!(user.password_hash.as_str(), "secret1");
        assert_eq!(user.role, crate::models::Role::User);

        let dup = f
            .verifier
            .register(Registration {
                email: "ANN@X.COM",
                ..ann()
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let f = fixture();
        let short = f
            .verifier
            .register(Registration {
                password: "123",
                ..ann()
            })
            .await
            .unwrap_err();
        assert!(matches!(short, AuthError::Validation(_)));

        let bad_email = f
            .verifier
            .register(Registration {
                email: "not-an-email",
                ..ann()
            })
            .await
            .unwrap_err();
        assert!(matches!(bad_email, AuthError::Validation(_)));
        assert_eq!(f.users.len().await, 0);
    }
}
