//! Handlers for the caller's own account

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{MessageResponse, UserResponse};
use crate::AppState;
use crate::error::AuthError;
use crate::middleware::{ClientAddress, CurrentUser};
use crate::models::{UserProfile, normalize_email};
use crate::security_log::{SecurityAction, SecurityEvent};
use crate::validation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub valid: bool,
    pub user: UserProfile,
}

pub async fn get_profile(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<UserResponse> {
    Json(UserResponse::new(&user))
}

/// Confirm that the presented access token is usable
pub async fn verify(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        success: true,
        valid: true,
        user: user.profile(),
    })
}

/// Update name, email and/or password
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    client: ClientAddress,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Json(payload) = payload?;

    if let Some(name) = payload.name.as_deref().filter(|name| !name.trim().is_empty()) {
        validation::validate_name(name).map_err(AuthError::Validation)?;
        user.name = name.trim().to_string();
    }

    if let Some(email) = payload.email.as_deref().filter(|email| !email.trim().is_empty()) {
        validation::validate_email(email).map_err(AuthError::Validation)?;
        let email = normalize_email(email);
        if email != user.email {
            if state.users.find_by_email(&email).await?.is_some() {
                return Err(AuthError::Conflict("Email is already in use".to_string()));
            }
            user.email = email;
        }
    }

    let mut password_changed = false;
    if let Some(new_password) = payload.new_password.as_deref().filter(|p| !p.is_empty()) {
        let current = payload
            .current_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AuthError::Validation("Current password is required".to_string())
            })?;
        validation::validate_password(new_password).map_err(AuthError::Validation)?;

        let hasher = state.credentials.hasher();
        if !hasher.verify(current, &user.password_hash)? {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }
        user.password_hash = hasher.hash(new_password)?;
        password_changed = true;
    }

    let user = state
        .users
        .update(&user)
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

    state.security_log.record(
        SecurityEvent::new(SecurityAction::ProfileUpdate)
            .user(user.id)
            .email(user.email.clone())
            .client(client.as_deref()),
    );
    if password_changed {
        info!("User {} changed their password", user.id);
        state.security_log.record(
            SecurityEvent::new(SecurityAction::PasswordChange)
                .user(user.id)
                .email(user.email.clone())
                .client(client.as_deref()),
        );
    }

    Ok(Json(UserResponse::with_message(&user, "Profile updated")))
}

/// Delete the caller's own account
pub async fn delete_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    client: ClientAddress,
) -> Result<Json<MessageResponse>, AuthError> {
    if !state.users.delete(user.id).await? {
        return Err(AuthError::NotFound("User not found".to_string()));
    }

    info!("User {} deleted their account", user.id);
    state.security_log.record(
        SecurityEvent::new(SecurityAction::AccountDeleted)
            .user(user.id)
            .email(user.email)
            .client(client.as_deref()),
    );

    Ok(Json(MessageResponse::new("Account deleted")))
}
