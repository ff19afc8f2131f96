//! Refresh flow controller
//!
//! Exchanges a refresh token for a new access/refresh pair. A token must
//! verify against the refresh secret and still be listed on the user's
//! record; tokens that verify but are no longer listed are treated as
//! possible replays and reported.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RefreshRotation;
use crate::error::AuthError;
use crate::jwt::{Claims, JwtService, TokenError, TokenPair};
use crate::models::User;
use crate::repositories::SharedUserStore;
use crate::security_log::{SecurityAction, SecurityEvent, SharedSecuritySink};
use crate::token_store::{RefreshTokenStore, is_valid_refresh_token};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    #[error("Invalid refresh token")]
    Invalid,

    #[error("Refresh token has expired, please log in again")]
    Expired,

    #[error("Invalid token type: expected a refresh token")]
    WrongTokenType,

    #[error("User not found")]
    UserNotFound,

    #[error("Account has been deactivated")]
    Inactive,

    #[error("Refresh token has been revoked, please log in again")]
    Revoked,
}

impl RefreshRejection {
    pub fn code(self) -> &'static str {
        match self {
            RefreshRejection::Invalid => "refresh_invalid",
            RefreshRejection::Expired => "refresh_expired",
            RefreshRejection::WrongTokenType => "wrong_token_type",
            RefreshRejection::UserNotFound => "user_not_found",
            RefreshRejection::Inactive => "account_inactive",
            RefreshRejection::Revoked => "refresh_revoked",
        }
    }
}

impl From<TokenError> for RefreshRejection {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => RefreshRejection::Expired,
            TokenError::WrongType { .. } => RefreshRejection::WrongTokenType,
            TokenError::Invalid(_) | TokenError::Signing(_) => RefreshRejection::Invalid,
        }
    }
}

#[derive(Clone)]
pub struct RefreshFlow {
    jwt_service: JwtService,
    users: SharedUserStore,
    token_store: RefreshTokenStore,
    rotation: RefreshRotation,
    security_log: SharedSecuritySink,
}

impl RefreshFlow {
    pub fn new(
        jwt_service: JwtService,
        users: SharedUserStore,
        token_store: RefreshTokenStore,
        rotation: RefreshRotation,
        security_log: SharedSecuritySink,
    ) -> Self {
        Self {
            jwt_service,
            users,
            token_store,
            rotation,
            security_log,
        }
    }

    /// Verify `raw`, mint a new pair and record the new refresh token.
    pub async fn refresh(
        &self,
        raw: &str,
        client: Option<&str>,
    ) -> Result<(User, TokenPair), AuthError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AuthError::Validation("Refresh token is required".to_string()));
        }

        let claims = self.jwt_service.decode_refresh_token(raw).map_err(|err| {
            debug!("Refresh token rejected: {}", err);
            AuthError::from(RefreshRejection::from(err))
        })?;

        let user = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .ok_or(RefreshRejection::UserNotFound)?;

        if !user.is_active {
            return Err(RefreshRejection::Inactive.into());
        }

        if !is_valid_refresh_token(&user, raw, Utc::now()) {
            self.report_reuse(&claims, client);
            return Err(RefreshRejection::Revoked.into());
        }

        let pair = self.jwt_service.issue_pair(&user).map_err(AuthError::internal)?;
        let single_use = self.rotation == RefreshRotation::SingleUse;
        let user = self
            .token_store
            .rotate(user, raw, &pair.refresh_token, single_use)
            .await?;

        self.security_log.record(
            SecurityEvent::new(SecurityAction::RefreshToken)
                .user(user.id)
                .email(user.email.clone())
                .client(client),
        );
        Ok((user, pair))
    }

    fn report_reuse(&self, claims: &Claims, client: Option<&str>) {
        warn!(
            "Refresh token for user {} is not in the active list",
            claims.user_id
        );
        self.security_log.record(
            SecurityEvent::new(SecurityAction::RefreshTokenReuse)
                .user(claims.user_id)
                .email(claims.email.clone())
                .client(client)
                .reason(RefreshRejection::Revoked.code()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::jwt::tests::test_config;
    use crate::models::HashedPassword;
    use crate::repositories::{InMemoryUserStore, UserStore};
    use crate::security_log::InMemorySecurityLog;
    use crate::token_store::TokenStorePolicy;
    use chrono::Duration;
    use std::sync::Arc;

    struct Fixture {
        users: Arc<InMemoryUserStore>,
        log: Arc<InMemorySecurityLog>,
        jwt: JwtService,
        store: RefreshTokenStore,
        flow: RefreshFlow,
    }

    fn fixture(rotation: RefreshRotation) -> Fixture {
        let config: AuthConfig = test_config();
        let users = Arc::new(InMemoryUserStore::new());
        let log = Arc::new(InMemorySecurityLog::new());
        let jwt = JwtService::new(&config);
        let store = RefreshTokenStore::new(users.clone(), TokenStorePolicy::default());
        let flow = RefreshFlow::new(jwt.clone(), users.clone(), store.clone(), rotation, log.clone());
        Fixture {
            users,
            log,
            jwt,
            store,
            flow,
        }
    }

    /// A stored user holding one freshly issued refresh token.
    async fn logged_in(f: &Fixture) -> (User, String) {
        let user = User::register(
            "Ann",
            "ann@x.com",
            HashedPassword::from_stored("$argon2id$stub"),
            Utc::now(),
        );
        let user = f.users.create(&user).await.unwrap();
        let token = f
            .jwt
            .generate_refresh_token(&user, Utc::now() - Duration::seconds(5))
            .unwrap();
        let user = f.store.add(user, &token).await.unwrap();
        (user, token)
    }

    async fn rejection(f: &Fixture, raw: &str) -> RefreshRejection {
        match f.flow.refresh(raw, None).await {
            Err(AuthError::Refresh(rejection)) => rejection,
            Err(other) => panic!("expected a refresh rejection, got {}", other),
            Ok(_) => panic!("expected a refresh rejection, got a new pair"),
        }
    }

    #[tokio::test]
    async fn valid_token_yields_new_pair() {
        let f = fixture(RefreshRotation::SingleUse);
        let (user, token) = logged_in(&f).await;

        let (refreshed, pair) = f.flow.refresh(&token, Some("10.0.0.1")).await.unwrap();
        assert_eq!(refreshed.id, user.id);
        assert_ne!(pair.refresh_token, token);
        assert!(f.jwt.decode_access_token(&pair.access_token).is_ok());

        let stored = f.users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(is_valid_refresh_token(&stored, &pair.refresh_token, Utc::now()));
        assert_eq!(f.log.actions(), vec![SecurityAction::RefreshToken]);
    }

    #[tokio::test]
    async fn single_use_rotation_rejects_replay() {
        let f = fixture(RefreshRotation::SingleUse);
        let (_, token) = logged_in(&f).await;

        f.flow.refresh(&token, None).await.unwrap();
        assert_eq!(rejection(&f, &token).await, RefreshRejection::Revoked);
        assert_eq!(
            f.log.actions(),
            vec![SecurityAction::RefreshToken, SecurityAction::RefreshTokenReuse]
        );
    }

    #[tokio::test]
    async fn sliding_window_keeps_the_old_token() {
        let f = fixture(RefreshRotation::SlidingWindow);
        let (user, token) = logged_in(&f).await;

        f.flow.refresh(&token, None).await.unwrap();
        f.flow.refresh(&token, None).await.unwrap();

        let stored = f.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_tokens.len(), 3);
    }

    #[tokio::test]
    async fn never_issued_token_is_invalid() {
        let f = fixture(RefreshRotation::SingleUse);
        logged_in(&f).await;

        let random = "ab".repeat(32);
        assert_eq!(rejection(&f, &random).await, RefreshRejection::Invalid);
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let f = fixture(RefreshRotation::SingleUse);
        let (user, _) = logged_in(&f).await;
        let access = f.jwt.generate_access_token(&user, Utc::now()).unwrap();

        assert_eq!(rejection(&f, &access).await, RefreshRejection::Invalid);
    }

    #[tokio::test]
    async fn expired_refresh_token() {
        let f = fixture(RefreshRotation::SingleUse);
        let (user, _) = logged_in(&f).await;
        let stale = f
            .jwt
            .generate_refresh_token(&user, Utc::now() - Duration::days(8))
            .unwrap();

        assert_eq!(rejection(&f, &stale).await, RefreshRejection::Expired);
    }

    #[tokio::test]
    async fn valid_signature_but_unlisted_token_is_revoked() {
        let f = fixture(RefreshRotation::SingleUse);
        let (user, _) = logged_in(&f).await;
        let unlisted = f.jwt.generate_refresh_token(&user, Utc::now()).unwrap();

        assert_eq!(rejection(&f, &unlisted).await, RefreshRejection::Revoked);
    }

    #[tokio::test]
    async fn logout_all_revokes_outstanding_tokens() {
        let f = fixture(RefreshRotation::SingleUse);
        let (user, token) = logged_in(&f).await;
        f.store.clear_all(user).await.unwrap();

        assert_eq!(rejection(&f, &token).await, RefreshRejection::Revoked);
    }

    #[tokio::test]
    async fn deactivated_and_deleted_users() {
        let f = fixture(RefreshRotation::SingleUse);
        let (mut user, token) = logged_in(&f).await;

        user.is_active = false;
        f.users.update(&user).await.unwrap();
        assert_eq!(rejection(&f, &token).await, RefreshRejection::Inactive);

        f.users.delete(user.id).await.unwrap();
        assert_eq!(rejection(&f, &token).await, RefreshRejection::UserNotFound);
    }

    #[tokio::test]
    async fn empty_token_is_a_validation_error() {
        let f = fixture(RefreshRotation::SingleUse);
        assert!(matches!(
            f.flow.refresh("  ", None).await,
            Err(AuthError::Validation(_))
        ));
    }
}
