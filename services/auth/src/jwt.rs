//! Token issuer: minting and decoding of access and refresh tokens
//!
//! Access and refresh tokens are HS256 JWTs signed with two independent
//! secrets. The issuer is stateless; persisting the refresh token in the
//! user's list is the caller's job (see [`crate::token_store`]).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{Role, User};

/// Token type claim
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented on every request
    Access,
    /// Long-lived token exchanged for a new pair
    Refresh,
}

/// JWT claims structure shared by both token types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    /// Present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Random 16-byte hex value; present on refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration (seconds since epoch)
    pub exp: i64,
}

impl Claims {
    /// Issued-at in milliseconds, the unit `last_logout_at` is compared in.
    pub fn issued_at_millis(&self) -> i64 {
        self.iat.saturating_mul(1000)
    }
}

/// Freshly minted access/refresh pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid: {0}")]
    Invalid(String),

    #[error("expected a {expected:?} token, got {found:?}")]
    WrongType { expected: TokenType, found: TokenType },

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
    access_token_expiry: u64,
    refresh_token_expiry: u64,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        JwtService {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            validation,
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
        }
    }

    /// Mint a new access/refresh pair for a validated user
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(user, Utc::now())
    }

    pub fn issue_pair_at(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.generate_access_token(user, now)?,
            refresh_token: self.generate_refresh_token(user, now)?,
        })
    }

    /// Generate an access token for a user
    pub fn generate_access_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            role: Some(user.role),
            token_type: TokenType::Access,
            session_id: None,
            iat: now.timestamp(),
            exp: now.timestamp() + self.access_token_expiry as i64,
        };
        self.sign(&claims, &self.access_encoding)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            role: None,
            token_type: TokenType::Refresh,
            session_id: Some(new_session_id()),
            iat: now.timestamp(),
            exp: now.timestamp() + self.refresh_token_expiry as i64,
        };
        self.sign(&claims, &self.refresh_encoding)
    }

    /// Verify an access token's signature, expiry and type
    pub fn decode_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_with(token, &self.access_decoding)?;
        expect_type(claims, TokenType::Access)
    }

    /// Verify a refresh token's signature, expiry and type
    pub fn decode_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_with(token, &self.refresh_decoding)?;
        expect_type(claims, TokenType::Refresh)
    }

    /// Get the access token expiry time in seconds
    pub fn access_token_expiry(&self) -> u64 {
        self.access_token_expiry
    }

    /// Get the refresh token lifetime
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_expiry as i64)
    }

    fn sign(&self, claims: &Claims, key: &EncodingKey) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn decode_with(&self, token: &str, key: &DecodingKey) -> Result<Claims, TokenError> {
        decode::<Claims>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

fn expect_type(claims: Claims, expected: TokenType) -> Result<Claims, TokenError> {
    if claims.token_type != expected {
        return Err(TokenError::WrongType {
            expected,
            found: claims.token_type,
        });
    }
    Ok(claims)
}

/// Random 16-byte session identifier, hex encoded
fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
