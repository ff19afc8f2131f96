//! In-memory user store for tests and database-less local runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{UserPage, UserQuery, UserStore};
use crate::models::User;

const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Uuid) -> bool {
    users
        .values()
        .any(|existing| existing.id != except && existing.email == email)
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: &User) -> DatabaseResult<User> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(DatabaseError::UniqueViolation("users_pkey".to_string()));
        }
        if email_taken(&users, &user.email, user.id) {
            return Err(DatabaseError::UniqueViolation(EMAIL_CONSTRAINT.to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| {
                user.reset_password_token.as_deref() == Some(token_hash)
                    && user.reset_password_expire.is_some_and(|expire| expire > now)
            })
            .cloned())
    }

    async fn update(&self, user: &User) -> DatabaseResult<Option<User>> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Ok(None);
        }
        if email_taken(&users, &user.email, user.id) {
            return Err(DatabaseError::UniqueViolation(EMAIL_CONSTRAINT.to_string()));
        }

        let mut stored = user.clone();
        stored.updated_at = Utc::now();
        users.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn list(&self, query: &UserQuery) -> DatabaseResult<UserPage> {
        let users = self.users.read().await;
        let needle = query.search_term().map(str::to_lowercase);

        let mut matching: Vec<&User> = users
            .values()
            .filter(|user| match &needle {
                Some(needle) => {
                    user.name.to_lowercase().contains(needle) || user.email.contains(needle)
                }
                None => true,
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(UserPage {
            users: page,
            total,
            page: query.page,
            limit: query.limit,
        })
    }
}
