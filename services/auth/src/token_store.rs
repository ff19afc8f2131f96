//! Refresh token store
//!
//! The list of active refresh tokens lives on the user record. The
//! functions in this module are pure: they take a `User` and hand back
//! the changed `User`. [`RefreshTokenStore`] pairs them with a write to
//! the [`UserStore`](crate::repositories::UserStore).

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::AuthError;
use crate::models::{RefreshTokenEntry, User};
use crate::repositories::SharedUserStore;

/// Bounds applied to every user's token list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStorePolicy {
    /// Maximum entries kept per user; the oldest are dropped first
    pub max_tokens: usize,
    /// Server-side lifetime of each entry
    pub ttl: Duration,
}

impl Default for TokenStorePolicy {
    fn default() -> Self {
        Self {
            max_tokens: 5,
            ttl: Duration::days(7),
        }
    }
}

/// Append a token, evicting from the front until the list fits the policy.
pub fn add_refresh_token(
    mut user: User,
    token: impl Into<String>,
    now: DateTime<Utc>,
    policy: &TokenStorePolicy,
) -> User {
    user.refresh_tokens.push(RefreshTokenEntry {
        token: token.into(),
        created_at: now,
        expires_at: now + policy.ttl,
    });

    let overflow = user.refresh_tokens.len().saturating_sub(policy.max_tokens);
    if overflow > 0 {
        user.refresh_tokens.drain(..overflow);
    }
    user
}

/// Drop every entry holding exactly this token. Removing an absent token is a no-op.
pub fn remove_refresh_token(mut user: User, token: &str) -> User {
    user.refresh_tokens.retain(|entry| entry.token != token);
    user
}

/// Empty the list and stamp the global logout instant.
pub fn clear_all_refresh_tokens(mut user: User, now: DateTime<Utc>) -> User {
    user.refresh_tokens.clear();
    user.last_logout_at = Some(now);
    user
}

/// True iff the token is in the list and its entry has not expired at `now`.
pub fn is_valid_refresh_token(user: &User, token: &str, now: DateTime<Utc>) -> bool {
    user.refresh_tokens
        .iter()
        .any(|entry| entry.token == token && entry.is_live(now))
}

/// Applies the pure list operations and persists the result.
#[derive(Clone)]
pub struct RefreshTokenStore {
    users: SharedUserStore,
    policy: TokenStorePolicy,
}

impl RefreshTokenStore {
    pub fn new(users: SharedUserStore, policy: TokenStorePolicy) -> Self {
        Self { users, policy }
    }

    pub async fn add(&self, user: User, token: &str) -> Result<User, AuthError> {
        let user = add_refresh_token(user, token, Utc::now(), &self.policy);
        debug!(
            "User {} now holds {} refresh tokens",
            user.id,
            user.refresh_tokens.len()
        );
        self.persist(user).await
    }

    pub async fn remove(&self, user: User, token: &str) -> Result<User, AuthError> {
        self.persist(remove_refresh_token(user, token)).await
    }

    pub async fn clear_all(&self, user: User) -> Result<User, AuthError> {
        self.persist(clear_all_refresh_tokens(user, Utc::now()))
            .await
    }

    /// Store `new_token`, removing `old_token` first when `single_use` is set.
    /// Both changes land in one write.
    pub async fn rotate(
        &self,
        user: User,
        old_token: &str,
        new_token: &str,
        single_use: bool,
    ) -> Result<User, AuthError> {
        let user = if single_use {
            remove_refresh_token(user, old_token)
        } else {
            user
        };
        self.add(user, new_token).await
    }

    async fn persist(&self, user: User) -> Result<User, AuthError> {
        self.users
            .update(&user)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
    }
}
