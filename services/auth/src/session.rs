//! Session authenticator
//!
//! Validates the access token of every protected request. The checks run
//! as an ordered pipeline and each failing step yields its own
//! [`SessionRejection`]; the only success is a resolved, active user
//! whose token predates no global logout.

use thiserror::Error;
use tracing::debug;

use crate::error::AuthError;
use crate::jwt::{Claims, JwtService, TokenError};
use crate::models::User;
use crate::repositories::SharedUserStore;
use crate::security_log::{SecurityAction, SecurityEvent, SharedSecuritySink};

/// Why an access token was not accepted
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    #[error("Access denied. No token provided.")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token type: expected an access token")]
    WrongTokenType,

    #[error("Access token has expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Account has been deactivated")]
    AccountDeactivated,

    #[error("Token has been revoked, please log in again")]
    TokenRevoked,
}

impl SessionRejection {
    pub fn code(self) -> &'static str {
        match self {
            SessionRejection::MissingToken => "unauthenticated",
            SessionRejection::InvalidToken => "invalid_token",
            SessionRejection::WrongTokenType => "wrong_token_type",
            SessionRejection::TokenExpired => "token_expired",
            SessionRejection::UserNotFound => "user_not_found",
            SessionRejection::AccountDeactivated => "account_inactive",
            SessionRejection::TokenRevoked => "token_revoked",
        }
    }

    fn security_action(self) -> Option<SecurityAction> {
        match self {
            SessionRejection::MissingToken => None,
            SessionRejection::InvalidToken | SessionRejection::WrongTokenType => {
                Some(SecurityAction::InvalidToken)
            }
            SessionRejection::TokenExpired => Some(SecurityAction::TokenExpired),
            SessionRejection::UserNotFound | SessionRejection::AccountDeactivated => {
                Some(SecurityAction::InvalidToken)
            }
            SessionRejection::TokenRevoked => Some(SecurityAction::TokenRevoked),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, SessionRejection> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(SessionRejection::MissingToken)
}

/// Map token verification failures onto session rejections.
pub fn classify_token_error(err: &TokenError) -> SessionRejection {
    match err {
        TokenError::Expired => SessionRejection::TokenExpired,
        TokenError::WrongType { .. } => SessionRejection::WrongTokenType,
        TokenError::Invalid(_) | TokenError::Signing(_) => SessionRejection::InvalidToken,
    }
}

/// Account-level checks once the token itself has been verified.
pub fn check_account(claims: &Claims, user: Option<User>) -> Result<User, SessionRejection> {
    let user = user.ok_or(SessionRejection::UserNotFound)?;

    if !user.is_active {
        return Err(SessionRejection::AccountDeactivated);
    }

    if let Some(logout_at) = user.last_logout_at {
        if claims.issued_at_millis() < logout_at.timestamp_millis() {
            return Err(SessionRejection::TokenRevoked);
        }
    }

    Ok(user)
}

#[derive(Clone)]
pub struct SessionAuthenticator {
    jwt_service: JwtService,
    users: SharedUserStore,
    security_log: SharedSecuritySink,
}

impl SessionAuthenticator {
    pub fn new(
        jwt_service: JwtService,
        users: SharedUserStore,
        security_log: SharedSecuritySink,
    ) -> Self {
        Self {
            jwt_service,
            users,
            security_log,
        }
    }

    /// Run the full pipeline against a raw `Authorization` header value.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        client: Option<&str>,
    ) -> Result<User, AuthError> {
        let token = bearer_token(authorization)?;

        let claims = match self.jwt_service.decode_access_token(token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!("Access token rejected: {}", err);
                let rejection = classify_token_error(&err);
                self.report(rejection, None, client);
                return Err(rejection.into());
            }
        };

        let user = self.users.find_by_id(claims.user_id).await?;
        check_account(&claims, user).map_err(|rejection| {
            self.report(rejection, Some(&claims), client);
            AuthError::from(rejection)
        })
    }

    fn report(&self, rejection: SessionRejection, claims: Option<&Claims>, client: Option<&str>) {
        let Some(action) = rejection.security_action() else {
            return;
        };

        let mut event = SecurityEvent::new(action)
            .client(client)
            .reason(rejection.code());
        if let Some(claims) = claims {
            event = event.user(claims.user_id).email(claims.email.clone());
        }
        self.security_log.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::test_config;
    use crate::models::HashedPassword;
    use crate::repositories::{InMemoryUserStore, UserStore};
    use crate::security_log::InMemorySecurityLog;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    struct Fixture {
        users: Arc<InMemoryUserStore>,
        log: Arc<InMemorySecurityLog>,
        jwt: JwtService,
        authenticator: SessionAuthenticator,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserStore::new());
        let log = Arc::new(InMemorySecurityLog::new());
        let jwt = JwtService::new(&test_config());
        let authenticator = SessionAuthenticator::new(jwt.clone(), users.clone(), log.clone());
        Fixture {
            users,
            log,
            jwt,
            authenticator,
        }
    }

    async fn stored_user(f: &Fixture) -> User {
        let user = User::register(
            "Ann",
            "ann@x.com",
            HashedPassword::from_stored("$argon2id$stub"),
            Utc::now(),
        );
        f.users.create(&user).await.unwrap()
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    async fn rejection(f: &Fixture, header: Option<&str>) -> SessionRejection {
        match f.authenticator.authenticate(header, None).await {
            Err(AuthError::Session(rejection)) => rejection,
            other => panic!("expected a session rejection, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(SessionRejection::MissingToken));
        assert_eq!(bearer_token(Some("Basic abc")), Err(SessionRejection::MissingToken));
        assert_eq!(bearer_token(Some("Bearer   ")), Err(SessionRejection::MissingToken));
    }

    #[tokio::test]
    async fn freshly_issued_token_authenticates() {
        let f = fixture();
        let user = stored_user(&f).await;
        let pair = f.jwt.issue_pair(&user).unwrap();

        let resolved = f
            .authenticator
            .authenticate(Some(&bearer(&pair.access_token)), None)
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.role, user.role);
    }

    #[tokio::test]
    async fn missing_and_garbage_tokens() {
        let f = fixture();
        assert_eq!(rejection(&f, None).await, SessionRejection::MissingToken);
        assert_eq!(
            rejection(&f, Some("Bearer not.a.jwt")).await,
            SessionRejection::InvalidToken
        );
        assert_eq!(f.log.actions(), vec![SecurityAction::InvalidToken]);
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let f = fixture();
        let user = stored_user(&f).await;
        let pair = f.jwt.issue_pair(&user).unwrap();

        assert_eq!(
            rejection(&f, Some(&bearer(&pair.refresh_token))).await,
            SessionRejection::InvalidToken
        );
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let f = fixture();
        let user = stored_user(&f).await;
        let token = f
            .jwt
            .generate_access_token(&user, Utc::now() - Duration::minutes(16))
            .unwrap();

        assert_eq!(
            rejection(&f, Some(&bearer(&token))).await,
            SessionRejection::TokenExpired
        );
    }

    #[tokio::test]
    async fn deleted_and_deactivated_users() {
        let f = fixture();
        let mut user = stored_user(&f).await;
        let token = f.jwt.issue_pair(&user).unwrap().access_token;

        user.is_active = false;
        f.users.update(&user).await.unwrap();
        assert_eq!(
            rejection(&f, Some(&bearer(&token))).await,
            SessionRejection::AccountDeactivated
        );

        f.users.delete(user.id).await.unwrap();
        assert_eq!(
            rejection(&f, Some(&bearer(&token))).await,
            SessionRejection::UserNotFound
        );
    }

    #[tokio::test]
    async fn tokens_issued_before_global_logout_are_revoked() {
        let f = fixture();
        let mut user = stored_user(&f).await;
        let issued = Utc::now() - Duration::minutes(5);
        let old_token = f.jwt.generate_access_token(&user, issued).unwrap();

        user.last_logout_at = Some(Utc::now() - Duration::minutes(1));
        f.users.update(&user).await.unwrap();

        assert_eq!(
            rejection(&f, Some(&bearer(&old_token))).await,
            SessionRejection::TokenRevoked
        );
        assert_eq!(f.log.actions(), vec![SecurityAction::TokenRevoked]);

        let new_token = f.jwt.generate_access_token(&user, Utc::now()).unwrap();
        assert!(f
            .authenticator
            .authenticate(Some(&bearer(&new_token)), None)
            .await
            .is_ok());
    }

    #[test]
    fn logout_all_revokes_whole_second_of_issued_tokens() {
        let second = 1_700_000_000_i64;
        let mut user = User::register(
            "Ann",
            "ann@x.com",
            HashedPassword::from_stored("$argon2id$stub"),
            Utc::now(),
        );
        user.last_logout_at = chrono::DateTime::from_timestamp_millis(second * 1000 + 500);

        let claims_at = |iat: i64| Claims {
            user_id: user.id,
            email: user.email.clone(),
            role: Some(user.role),
            token_type: crate::jwt::TokenType::Access,
            session_id: None,
            iat,
            exp: iat + 900,
        };

        // Issued in the logout second, after the logout instant: still revoked
        assert_eq!(
            check_account(&claims_at(second), Some(user.clone())).unwrap_err(),
            SessionRejection::TokenRevoked
        );
        assert_eq!(
            check_account(&claims_at(second - 1), Some(user.clone())).unwrap_err(),
            SessionRejection::TokenRevoked
        );
        assert!(check_account(&claims_at(second + 1), Some(user)).is_ok());
    }
}
