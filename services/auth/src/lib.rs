//! Authentication and session core
//!
//! Password login, JWT access/refresh pairs with server-side refresh token
//! tracking, request authentication, role checks, and the HTTP surface
//! that exposes them.

pub mod config;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod password_reset;
pub mod rate_limiter;
pub mod rbac;
pub mod refresh;
pub mod repositories;
pub mod routes;
pub mod security_log;
pub mod session;
pub mod token_store;
pub mod validation;

use std::sync::Arc;

use chrono::Duration;

use crate::config::AuthConfig;
use crate::credentials::CredentialVerifier;
use crate::error::AuthError;
use crate::jwt::{JwtService, TokenPair};
use crate::models::User;
use crate::password::PasswordHasher;
use crate::password_reset::PasswordResetService;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::refresh::RefreshFlow;
use crate::repositories::SharedUserStore;
use crate::security_log::SharedSecuritySink;
use crate::session::SessionAuthenticator;
use crate::token_store::{RefreshTokenStore, TokenStorePolicy};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub users: SharedUserStore,
    pub jwt_service: JwtService,
    pub credentials: CredentialVerifier,
    pub authenticator: SessionAuthenticator,
    pub refresh_flow: RefreshFlow,
    pub token_store: RefreshTokenStore,
    pub password_reset: PasswordResetService,
    pub rate_limiter: RateLimiter,
    pub security_log: SharedSecuritySink,
}

impl AppState {
    /// Wire every component from one configuration and one record store.
    pub fn new(config: AuthConfig, users: SharedUserStore, security_log: SharedSecuritySink) -> Self {
        let jwt_service = JwtService::new(&config);
        let hasher = PasswordHasher::new();
        let token_store = RefreshTokenStore::new(
            users.clone(),
            TokenStorePolicy {
                max_tokens: config.max_refresh_tokens,
                ttl: jwt_service.refresh_token_ttl(),
            },
        );

        let credentials =
            CredentialVerifier::new(users.clone(), hasher.clone(), security_log.clone());
        let authenticator =
            SessionAuthenticator::new(jwt_service.clone(), users.clone(), security_log.clone());
        let refresh_flow = RefreshFlow::new(
            jwt_service.clone(),
            users.clone(),
            token_store.clone(),
            config.refresh_rotation,
            security_log.clone(),
        );
        let password_reset = PasswordResetService::new(
            users.clone(),
            hasher,
            Duration::seconds(config.password_reset_expiry as i64),
            security_log.clone(),
        );
        let rate_limiter = RateLimiter::new(RateLimiterConfig::from(&config));

        Self {
            config: Arc::new(config),
            users,
            jwt_service,
            credentials,
            authenticator,
            refresh_flow,
            token_store,
            password_reset,
            rate_limiter,
            security_log,
        }
    }

    /// Issue a pair for `user` and record its refresh token.
    pub async fn open_session(&self, user: User) -> Result<(User, TokenPair), AuthError> {
        let pair = self.jwt_service.issue_pair(&user).map_err(AuthError::internal)?;
        let user = self.token_store.add(user, &pair.refresh_token).await?;
        Ok((user, pair))
    }
}
