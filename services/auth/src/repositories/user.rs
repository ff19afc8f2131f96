//! PostgreSQL user repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::{debug, info};
use uuid::Uuid;

use super::{UserPage, UserQuery, UserStore};
use crate::models::{HashedPassword, RefreshTokenEntry, Role, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_active, refresh_tokens, \
     last_logout_at, reset_password_token, reset_password_expire, created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations from `services/auth/migrations`
    pub async fn migrate(&self) -> DatabaseResult<()> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to run migrations: {e}")))?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> DatabaseResult<User> {
    let role: String = row.try_get("role").map_err(DatabaseError::Query)?;
    let role: Role = role
        .parse()
        .map_err(|e: crate::models::UnknownRole| DatabaseError::Corrupt(e.to_string()))?;
    let refresh_tokens: Json<Vec<RefreshTokenEntry>> =
        row.try_get("refresh_tokens").map_err(DatabaseError::Query)?;
    let password_hash: String = row.try_get("password_hash").map_err(DatabaseError::Query)?;

    Ok(User {
        id: row.try_get("id").map_err(DatabaseError::Query)?,
        name: row.try_get("name").map_err(DatabaseError::Query)?,
        email: row.try_get("email").map_err(DatabaseError::Query)?,
        password_hash: HashedPassword::from_stored(password_hash),
        role,
        is_active: row.try_get("is_active").map_err(DatabaseError::Query)?,
        refresh_tokens: refresh_tokens.0,
        last_logout_at: row.try_get("last_logout_at").map_err(DatabaseError::Query)?,
        reset_password_token: row
            .try_get("reset_password_token")
            .map_err(DatabaseError::Query)?,
        reset_password_expire: row
            .try_get("reset_password_expire")
            .map_err(DatabaseError::Query)?,
        created_at: row.try_get("created_at").map_err(DatabaseError::Query)?,
        updated_at: row.try_get("updated_at").map_err(DatabaseError::Query)?,
    })
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, user: &User) -> DatabaseResult<User> {
        info!("Creating new user: {}", user.email);

        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, is_active, refresh_tokens,
                               last_logout_at, reset_password_token, reset_password_expire,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {USER_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password_hash.as_str())
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(Json(&user.refresh_tokens))
            .bind(user.last_logout_at)
            .bind(&user.reset_password_token)
            .bind(user.reset_password_expire)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        user_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        debug!("Finding user by ID: {}", id);

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        debug!("Finding user by email: {}", email);

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE reset_password_token = $1 AND reset_password_expire > $2"
        );
        let row = sqlx::query(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn update(&self, user: &User) -> DatabaseResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, role = $5, is_active = $6,
                refresh_tokens = $7, last_logout_at = $8, reset_password_token = $9,
                reset_password_expire = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password_hash.as_str())
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(Json(&user.refresh_tokens))
            .bind(user.last_logout_at)
            .bind(&user.reset_password_token)
            .bind(user.reset_password_expire)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        info!("Deleting user: {}", id);

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &UserQuery) -> DatabaseResult<UserPage> {
        let pattern = query.search_term().map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE $1::TEXT IS NULL OR name ILIKE $1 OR email ILIKE $1",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE $1::TEXT IS NULL OR name ILIKE $1 OR email ILIKE $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(i64::from(query.limit))
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        let users = rows
            .iter()
            .map(user_from_row)
            .collect::<DatabaseResult<Vec<_>>>()?;

        Ok(UserPage {
            users,
            total: total.max(0) as u64,
            page: query.page,
            limit: query.limit,
        })
    }
}
