//! Middleware for access token validation and role checks

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::AuthError;
use crate::models::{Role, User};
use crate::rbac::authorize;
use crate::session::SessionRejection;
use crate::AppState;

/// The user resolved by [`auth_middleware`], stored in request extensions
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Best-effort caller address: first `X-Forwarded-For` hop, else the peer address
#[derive(Debug, Clone, Default)]
pub struct ClientAddress(pub Option<String>);

impl ClientAddress {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|hop| hop.trim().to_string())
            .filter(|hop| !hop.is_empty());

        let address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientAddress(address))
    }
}

/// Run the session authenticator and attach the user to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    client: ClientAddress,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let user = state
        .authenticator
        .authenticate(authorization, client.as_deref())
        .await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

fn require(req: &Request<Body>, minimum: Role) -> Result<(), AuthError> {
    let CurrentUser(user) = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(SessionRejection::MissingToken)?;

    authorize(user.role, minimum).map_err(|err| {
        debug!("User {} ({}) denied: {}", user.id, user.role, err);
        AuthError::from(err)
    })
}

/// Admit admins only
pub async fn require_admin(req: Request<Body>, next: Next) -> Result<Response, AuthError> {
    require(&req, Role::Admin)?;
    Ok(next.run(req).await)
}

/// Admit moderators and admins
pub async fn require_moderator(req: Request<Body>, next: Next) -> Result<Response, AuthError> {
    require(&req, Role::Moderator)?;
    Ok(next.run(req).await)
}
