//! Password reset
//!
//! A reset token is 32 random bytes, hex encoded. Only its SHA-256 digest
//! is stored on the user, together with an expiry; the raw value exists
//! only in the response to the requester.

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::AuthError;
use crate::models::{User, normalize_email};
use crate::password::PasswordHasher;
use crate::repositories::SharedUserStore;
use crate::security_log::{SecurityAction, SecurityEvent, SharedSecuritySink};
use crate::validation;

/// SHA-256 hex digest under which a reset token is stored
pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn new_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct PasswordResetService {
    users: SharedUserStore,
    hasher: PasswordHasher,
    ttl: Duration,
    security_log: SharedSecuritySink,
}

impl PasswordResetService {
    pub fn new(
        users: SharedUserStore,
        hasher: PasswordHasher,
        ttl: Duration,
        security_log: SharedSecuritySink,
    ) -> Self {
        Self {
            users,
            hasher,
            ttl,
            security_log,
        }
    }

    /// Start a reset for `email`.
    ///
    /// Returns the raw token when the account exists, `None` otherwise.
    /// Callers must answer both cases identically.
    pub async fn request(
        &self,
        email: &str,
        client: Option<&str>,
    ) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }

        let Some(mut user) = self.users.find_by_email(&email).await? else {
            debug!("Password reset requested for unknown email {}", email);
            return Ok(None);
        };

        let raw = new_reset_token();
        user.reset_password_token = Some(hash_reset_token(&raw));
        user.reset_password_expire = Some(Utc::now() + self.ttl);
        self.save(&user).await?;

        self.security_log.record(
            SecurityEvent::new(SecurityAction::PasswordResetRequest)
                .user(user.id)
                .email(user.email.clone())
                .client(client),
        );
        debug!("Reset token issued for {}: {}", user.email, raw);
        Ok(Some(raw))
    }

    /// Consume a reset token and store the new password.
    pub async fn reset(
        &self,
        raw: &str,
        new_password: &str,
        client: Option<&str>,
    ) -> Result<User, AuthError> {
        validation::validate_password(new_password).map_err(AuthError::Validation)?;

        // Links sometimes carry the route's colon along with the token
        let raw = raw.trim().trim_start_matches(':');
        let digest = hash_reset_token(raw);

        let Some(mut user) = self.users.find_by_reset_token(&digest, Utc::now()).await? else {
            return Err(AuthError::Validation(
                "Password reset token is invalid or has expired".to_string(),
            ));
        };

        user.password_hash = self.hasher.hash(new_password)?;
        user.reset_password_token = None;
        user.reset_password_expire = None;
        let user = self.save(&user).await?;

        info!("Password reset for user {}", user.id);
        self.security_log.record(
            SecurityEvent::new(SecurityAction::PasswordReset)
                .user(user.id)
                .email(user.email.clone())
                .client(client),
        );
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<User, AuthError> {
        self.users
            .update(user)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
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
        service: PasswordResetService,
    }

    async fn fixture() -> (Fixture, User) {
        let users = Arc::new(InMemoryUserStore::new());
        let log = Arc::new(InMemorySecurityLog::new());
        let hasher = PasswordHasher::new();
        let service =
            PasswordResetService::new(users.clone(), hasher.clone(), Duration::minutes(10), log.clone());

        let user = User::register("Ann", "ann@x.com", hasher.hash("secret1").unwrap(), Utc::now());
        let user = users.create(&user).await.unwrap();
        (
            Fixture {
                users,
                log,
                service,
            },
            user,
        )
    }

    #[test]
    fn token_digest_is_sha256_hex() {
        assert_eq!(
            hash_reset_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn unknown_email_yields_nothing() {
        let (f, _) = fixture().await;
        assert_eq!(f.service.request("nobody@x.com", None).await.unwrap(), None);
        assert!(f.log.actions().is_empty());
    }

    #[tokio::test]
    async fn only_the_digest_is_stored() {
        let (f, user) = fixture().await;
        let raw = f.service.request(" ANN@x.com ", None).await.unwrap().unwrap();
        assert_eq!(raw.len(), 64);

        let stored = f.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.reset_password_token, Some(hash_reset_token(&raw)));
        assert!(stored.reset_password_expire.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn reset_replaces_password_and_consumes_token() {
        let (f, user) = fixture().await;
        let raw = f.service.request("ann@x.com", None).await.unwrap().unwrap();

        f.service.reset(&raw, "newsecret", None).await.unwrap();

        let stored = f.users.find_by_id(user.id).await.unwrap().unwrap();
        let hasher = PasswordHasher::new();
        assert!(hasher.verify("newsecret", &stored.password_hash).unwrap());
        assert!(stored.reset_password_token.is_none());

        assert!(matches!(
            f.service.reset(&raw, "another1", None).await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(
            f.log.actions(),
            vec![SecurityAction::PasswordResetRequest, SecurityAction::PasswordReset]
        );
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (f, user) = fixture().await;
        let raw = f.service.request("ann@x.com", None).await.unwrap().unwrap();

        let mut stored = f.users.find_by_id(user.id).await.unwrap().unwrap();
        stored.reset_password_expire = Some(Utc::now() - Duration::seconds(1));
        f.users.update(&stored).await.unwrap();

        assert!(matches!(
            f.service.reset(&raw, "newsecret", None).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_lookup() {
        let (f, _) = fixture().await;
        let raw = f.service.request("ann@x.com", None).await.unwrap().unwrap();

        assert!(matches!(
            f.service.reset(&raw, "abc", None).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn leading_colon_is_tolerated() {
        let (f, _) = fixture().await;
        let raw = f.service.request("ann@x.com", None).await.unwrap().unwrap();

        assert!(f.service.reset(&format!(":{}", raw), "newsecret", None).await.is_ok());
    }
}
