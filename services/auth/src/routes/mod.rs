//! HTTP surface of the authentication service

use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::Serialize;

use crate::AppState;
use crate::jwt::TokenPair;
use crate::middleware::{auth_middleware, require_admin, require_moderator};
use crate::models::{User, UserProfile};

pub mod admin;
pub mod auth;
pub mod profile;

/// Body of every successful response that carries just a message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// A single user, optionally with a message
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: UserProfile,
}

impl UserResponse {
    pub fn new(user: &User) -> Self {
        Self {
            success: true,
            message: None,
            user: user.profile(),
        }
    }

    pub fn with_message(user: &User, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(user)
        }
    }
}

/// Returned by signup and login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: UserProfile,
}

impl SessionResponse {
    pub fn new(message: impl Into<String>, pair: TokenPair, expires_in: u64, user: &User) -> Self {
        Self {
            success: true,
            message: message.into(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in,
            user: user.profile(),
        }
    }
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password/:token", post(auth::reset_password));

    let admin = Router::new()
        .route(
            "/auth/admin/users",
            get(admin::list_users).route_layer(from_fn(require_moderator)),
        )
        .route(
            "/auth/admin/users/:id",
            get(admin::get_user)
                .route_layer(from_fn(require_moderator))
                .merge(delete(admin::delete_user).route_layer(from_fn(require_admin))),
        )
        .route(
            "/auth/admin/users/:id/role",
            put(admin::update_role).route_layer(from_fn(require_admin)),
        )
        .route(
            "/auth/admin/users/:id/status",
            put(admin::update_status).route_layer(from_fn(require_admin)),
        );

    let authenticated = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route(
            "/auth/profile",
            get(profile::get_profile)
                .put(profile::update_profile)
                .delete(profile::delete_profile),
        )
        .route("/auth/verify", get(profile::verify))
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    public.merge(authenticated).with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}
