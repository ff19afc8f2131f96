//! Signup, login, token refresh, logout and password reset handlers

use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{MessageResponse, SessionResponse};
use crate::AppState;
use crate::credentials::Registration;
use crate::error::AuthError;
use crate::middleware::{ClientAddress, CurrentUser};
use crate::models::normalize_email;
use crate::rate_limiter::login_key;
use crate::security_log::{SecurityAction, SecurityEvent};

/// Request for account registration. Any role sent by the client is ignored.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request for token refresh
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// Response for token refresh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
}

const FORGOT_PASSWORD_MESSAGE: &str =
    "If the email exists, a password reset link has been sent";

/// User signup endpoint
pub async fn signup(
    State(state): State<AppState>,
    client: ClientAddress,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let Json(payload) = payload?;

    let user = state
        .credentials
        .register(Registration {
            name: &payload.name,
            email: &payload.email,
            password: &payload.password,
        })
        .await?;

    let (user, pair) = state.open_session(user).await?;
    state.security_log.record(
        SecurityEvent::new(SecurityAction::LoginSuccess)
            .user(user.id)
            .email(user.email.clone())
            .client(client.as_deref())
            .reason("signup"),
    );

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::new(
            "Registration successful",
            pair,
            state.jwt_service.access_token_expiry(),
            &user,
        )),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    client: ClientAddress,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AuthError> {
    let Json(payload) = payload?;

    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }
    if payload.password.is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }

    let key = login_key(client.as_deref(), &email);
    if !state.rate_limiter.is_allowed(&key).await {
        state.security_log.record(
            SecurityEvent::new(SecurityAction::LoginBruteforceBlocked)
                .email(email)
                .client(client.as_deref()),
        );
        return Err(AuthError::TooManyAttempts);
    }

    let user = match state
        .credentials
        .verify(&email, &payload.password, client.as_deref())
        .await
    {
        Ok(user) => user,
        Err(err) => {
            if matches!(err, AuthError::Credential(_))
                && state.rate_limiter.record_failure(&key).await
            {
                warn!("Login for {} blocked after repeated failures", email);
            }
            return Err(err);
        }
    };

    state.rate_limiter.reset(&key).await;
    let (user, pair) = state.open_session(user).await?;

    info!("User {} logged in", user.id);
    state.security_log.record(
        SecurityEvent::new(SecurityAction::LoginSuccess)
            .user(user.id)
            .email(user.email.clone())
            .client(client.as_deref()),
    );

    Ok(Json(SessionResponse::new(
        "Login successful",
        pair,
        state.jwt_service.access_token_expiry(),
        &user,
    )))
}

/// Refresh token endpoint
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientAddress,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<RefreshTokenResponse>, AuthError> {
    let Json(payload) = payload?;

    let (_, pair) = state
        .refresh_flow
        .refresh(&payload.refresh_token, client.as_deref())
        .await?;

    Ok(Json(RefreshTokenResponse {
        success: true,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: state.jwt_service.access_token_expiry(),
    }))
}

/// Logout endpoint; drops the presented refresh token if one is sent
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    client: ClientAddress,
    payload: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let token = payload
        .and_then(|Json(body)| body.refresh_token)
        .filter(|token| !token.is_empty());

    let user = match token {
        Some(token) => state.token_store.remove(user, &token).await?,
        None => user,
    };

    state.security_log.record(
        SecurityEvent::new(SecurityAction::Logout)
            .user(user.id)
            .email(user.email.clone())
            .client(client.as_deref()),
    );

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Logout from every device
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    client: ClientAddress,
) -> Result<Json<MessageResponse>, AuthError> {
    let user = state.token_store.clear_all(user).await?;

    info!("User {} logged out from all devices", user.id);
    state.security_log.record(
        SecurityEvent::new(SecurityAction::LogoutAll)
            .user(user.id)
            .email(user.email.clone())
            .client(client.as_deref()),
    );

    Ok(Json(MessageResponse::new("Logged out from all devices")))
}

/// Start a password reset. The answer does not reveal whether the email exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    client: ClientAddress,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ForgotPasswordResponse>, AuthError> {
    let Json(payload) = payload?;

    let token = state
        .password_reset
        .request(&payload.email, client.as_deref())
        .await?;

    Ok(Json(ForgotPasswordResponse {
        success: true,
        message: FORGOT_PASSWORD_MESSAGE.to_string(),
        reset_token: token.filter(|_| state.config.expose_reset_token),
    }))
}

/// Complete a password reset
pub async fn reset_password(
    State(state): State<AppState>,
    client: ClientAddress,
    token: Result<Path<String>, PathRejection>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Path(token) = token?;
    let Json(payload) = payload?;

    state
        .password_reset
        .reset(&token, &payload.password, client.as_deref())
        .await?;

    Ok(Json(MessageResponse::new(
        "Password has been reset, please log in with the new password",
    )))
}
