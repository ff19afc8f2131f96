//! User management for moderators and admins
//!
//! Role gates are applied by the router. The self-protection rules below
//! are business rules of these endpoints: an admin cannot delete,
//! deactivate or re-role their own account, and cannot delete another
//! admin.

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{MessageResponse, UserResponse};
use crate::AppState;
use crate::error::AuthError;
use crate::middleware::{ClientAddress, CurrentUser};
use crate::models::{Role, User, UserProfile};
use crate::repositories::UserQuery;
use crate::security_log::{SecurityAction, SecurityEvent};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl From<ListUsersParams> for UserQuery {
    fn from(params: ListUsersParams) -> Self {
        let defaults = UserQuery::default();
        UserQuery {
            page: params.page.unwrap_or(defaults.page).max(1),
            limit: params.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
            search: params.search,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub count: usize,
    pub users: Vec<UserProfile>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    params: Result<Query<ListUsersParams>, QueryRejection>,
) -> Result<Json<UserListResponse>, AuthError> {
    let Query(params) = params?;
    let page = state.users.list(&UserQuery::from(params)).await?;

    let users: Vec<UserProfile> = page.users.iter().map(UserProfile::from).collect();
    Ok(Json(UserListResponse {
        success: true,
        count: users.len(),
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            pages: page.pages(),
        },
        users,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Path(id) = id?;
    let user = load(&state, id).await?;
    Ok(Json(UserResponse::new(&user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    client: ClientAddress,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Path(id) = id?;
    if id == admin.id {
        return Err(AuthError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }

    let target = load(&state, id).await?;
    if target.role == Role::Admin {
        return Err(AuthError::Validation(
            "Admin accounts cannot be deleted".to_string(),
        ));
    }

    if !state.users.delete(id).await? {
        return Err(AuthError::NotFound("User not found".to_string()));
    }

    info!("Admin {} deleted user {}", admin.id, target.id);
    state.security_log.record(
        SecurityEvent::new(SecurityAction::UserDeleted)
            .user(admin.id)
            .email(admin.email)
            .client(client.as_deref())
            .target(target.id),
    );

    Ok(Json(MessageResponse::new("User deleted successfully")))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    client: ClientAddress,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Path(id) = id?;
    let Json(payload) = payload?;

    let role: Role = payload
        .role
        .parse()
        .map_err(|err: crate::models::UnknownRole| AuthError::Validation(err.to_string()))?;
    if id == admin.id {
        return Err(AuthError::Validation(
            "You cannot change your own role".to_string(),
        ));
    }

    let mut target = load(&state, id).await?;
    target.role = role;
    let target = save(&state, &target).await?;

    info!("Admin {} set role of {} to {}", admin.id, target.id, role);
    state.security_log.record(
        SecurityEvent::new(SecurityAction::RoleUpdated)
            .user(admin.id)
            .email(admin.email)
            .client(client.as_deref())
            .target(target.id),
    );

    Ok(Json(UserResponse::with_message(
        &target,
        format!("Role updated to {}", role),
    )))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    client: ClientAddress,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Path(id) = id?;
    let Json(payload) = payload?;

    if id == admin.id && !payload.is_active {
        return Err(AuthError::Validation(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let mut target = load(&state, id).await?;
    target.is_active = payload.is_active;
    let target = save(&state, &target).await?;

    let status = if target.is_active { "activated" } else { "deactivated" };
    info!("Admin {} {} user {}", admin.id, status, target.id);
    state.security_log.record(
        SecurityEvent::new(SecurityAction::StatusUpdated)
            .user(admin.id)
            .email(admin.email)
            .client(client.as_deref())
            .target(target.id),
    );

    Ok(Json(UserResponse::with_message(
        &target,
        format!("User {}", status),
    )))
}

async fn load(state: &AppState, id: Uuid) -> Result<User, AuthError> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
}

async fn save(state: &AppState, user: &User) -> Result<User, AuthError> {
    state
        .users
        .update(user)
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
}
