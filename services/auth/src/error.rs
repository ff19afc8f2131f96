//! Error type for the authentication service and its HTTP mapping
//!
//! Every expected failure has a stable machine code and a human-readable
//! message. Unexpected failures are logged in full and answered with a
//! generic internal error.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::credentials::CredentialError;
use crate::password::PasswordError;
use crate::rbac::AuthzError;
use crate::refresh::RefreshRejection;
use crate::session::SessionRejection;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Login failed
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Access token rejected by the session authenticator
    #[error(transparent)]
    Session(#[from] SessionRejection),

    /// Refresh token rejected by the refresh flow
    #[error(transparent)]
    Refresh(#[from] RefreshRejection),

    /// Authenticated, but the role is insufficient
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Too many failed login attempts, please try again later")]
    TooManyAttempts,

    #[error(transparent)]
    Store(#[from] DatabaseError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        AuthError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Credential(CredentialError::Inactive) => StatusCode::FORBIDDEN,
            AuthError::Credential(_) => StatusCode::UNAUTHORIZED,
            AuthError::Session(SessionRejection::AccountDeactivated) => StatusCode::FORBIDDEN,
            AuthError::Session(_) => StatusCode::UNAUTHORIZED,
            AuthError::Refresh(RefreshRejection::Inactive) => StatusCode::FORBIDDEN,
            AuthError::Refresh(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Store(DatabaseError::UniqueViolation(_)) => StatusCode::CONFLICT,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Store(_) | AuthError::Password(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable, machine-distinguishable error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Credential(err) => err.code(),
            AuthError::Session(rejection) => rejection.code(),
            AuthError::Refresh(rejection) => rejection.code(),
            AuthError::Forbidden(_) => "forbidden",
            AuthError::NotFound(_) => "not_found",
            AuthError::Conflict(_) | AuthError::Store(DatabaseError::UniqueViolation(_)) => {
                "conflict"
            }
            AuthError::Validation(_) => "validation_error",
            AuthError::TooManyAttempts => "too_many_attempts",
            AuthError::Store(_) | AuthError::Password(_) | AuthError::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Message safe to show to the client
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Store(DatabaseError::UniqueViolation(_)) => {
                "Email is already in use".to_string()
            }
            AuthError::Store(_) | AuthError::Password(_) | AuthError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AuthError {
    fn from(rejection: PathRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AuthError {
    fn from(rejection: QueryRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "code": self.code(),
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}
