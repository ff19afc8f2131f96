//! User record store
//!
//! Components depend on [`UserStore`] only. Updates are whole-record
//! writes; two concurrent read-modify-write cycles on the same user race
//! and the last writer wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::User;

pub mod memory;
pub mod user;

pub use memory::InMemoryUserStore;
pub use user::UserRepository;

/// Listing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    /// Case-insensitive substring match on name or email
    pub search: Option<String>,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
        }
    }
}

impl UserQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// One page of users, newest first
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl UserPage {
    pub fn pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; a taken email fails with `UniqueViolation`.
    async fn create(&self, user: &User) -> DatabaseResult<User>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    /// Find the user holding this reset token digest, if it has not expired at `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<User>>;

    /// Overwrite the stored record. Returns `None` when the user no longer exists.
    async fn update(&self, user: &User) -> DatabaseResult<Option<User>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> DatabaseResult<bool>;

    async fn list(&self, query: &UserQuery) -> DatabaseResult<UserPage>;
}

pub type SharedUserStore = Arc<dyn UserStore>;
