//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::{RefreshTokenEntry, Role};

/// A stored password hash (PHC string). Never holds plaintext.
///
/// The only ways to get one are hashing through
/// [`PasswordHasher`](crate::password::PasswordHasher) or loading a value
/// that was hashed before it was persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Wrap a hash read back from storage.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

/// User entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Always stored trimmed and lowercased.
    pub email: String,
    pub password_hash: HashedPassword,
    pub role: Role,
    pub is_active: bool,
    /// Oldest first; eviction drops from the front.
    pub refresh_tokens: Vec<RefreshTokenEntry>,
    /// Access tokens issued before this instant are rejected.
    pub last_logout_at: Option<DateTime<Utc>>,
    /// SHA-256 hex digest of the outstanding password reset token.
    pub reset_password_token: Option<String>,
    pub reset_password_expire: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a freshly registered user.
    ///
    /// The password must already be hashed; nothing downstream hashes it.
    pub fn register(
        name: &str,
        email: &str,
        password_hash: HashedPassword,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role: Role::default(),
            is_active: true,
            refresh_tokens: Vec::new(),
            last_logout_at: None,
            reset_password_token: None,
            reset_password_expire: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Canonical form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Outward representation of a user; carries no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub active_sessions: usize,
    pub last_logout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_active: user.is_active,
            active_sessions: user.refresh_tokens.len(),
            last_logout_at: user.last_logout_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
