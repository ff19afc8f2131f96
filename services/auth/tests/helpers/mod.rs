//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use auth_service::AppState;
use auth_service::config::AuthConfig;
use auth_service::models::Role;
use auth_service::repositories::{InMemoryUserStore, UserStore};
use auth_service::routes::create_router;
use auth_service::security_log::InMemorySecurityLog;

/// Test application context
pub struct TestApp {
    pub router: Router,
    pub users: Arc<InMemoryUserStore>,
    pub security_log: Arc<InMemorySecurityLog>,
}

/// Tokens and id of a signed-in test user
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let security_log = Arc::new(InMemorySecurityLog::new());
        let state = AppState::new(config, users.clone(), security_log.clone());

        Self {
            router: create_router(state),
            users,
            security_log,
        }
    }

    /// Send a request and return status plus parsed JSON body
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("DELETE", uri, token, None).await
    }

    /// Register a user and return the session from the signup response
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Session {
        let (status, body) = self
            .post(
                "/auth/signup",
                None,
                json!({ "name": name, "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        session_from(&body)
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/auth/login",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register a user with the given role and log them in again so the
    /// access token carries it
    pub async fn signup_with_role(&self, name: &str, email: &str, role: Role) -> Session {
        let session = self.signup(name, email, "secret1").await;
        let user = self.users.find_by_id(session.user_id).await.unwrap().unwrap();
        self.users.update(&user.with_role(role)).await.unwrap();

        let (status, body) = self.login(email, "secret1").await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        session_from(&body)
    }
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::new("integration-access-secret", "integration-refresh-secret");
    config.expose_reset_token = true;
    config
}

pub fn session_from(body: &Value) -> Session {
    Session {
        user_id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
        access_token: body["accessToken"].as_str().unwrap().to_string(),
        refresh_token: body["refreshToken"].as_str().unwrap().to_string(),
    }
}
