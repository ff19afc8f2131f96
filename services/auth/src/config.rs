//! Service configuration, loaded once at startup and passed down explicitly

use config::{Config, Environment};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// What happens to the presented refresh token when it is exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRotation {
    /// The presented token is removed as its replacement is stored.
    SingleUse,
    /// The presented token stays valid until it ages out of the bounded list.
    SlidingWindow,
}

impl FromStr for RefreshRotation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single_use" | "single-use" => Ok(RefreshRotation::SingleUse),
            "sliding_window" | "sliding-window" => Ok(RefreshRotation::SlidingWindow),
            other => Err(ConfigError::Invalid {
                key: "REFRESH_ROTATION",
                reason: format!("unknown rotation policy '{}'", other),
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// Authentication core configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,
    /// HMAC secret for refresh tokens; never equal to `access_secret`
    pub refresh_secret: String,
    /// Access token lifetime in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token lifetime in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
    /// Refresh tokens kept per user (default: 5)
    pub max_refresh_tokens: usize,
    pub refresh_rotation: RefreshRotation,
    /// Password reset token lifetime in seconds (default: 10 minutes)
    pub password_reset_expiry: u64,
    /// Failed logins allowed per window before the caller is blocked
    pub login_max_attempts: u32,
    pub login_window_seconds: u64,
    /// Return raw password reset tokens in the HTTP response (development only)
    pub expose_reset_token: bool,
    pub bind_address: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("max_refresh_tokens", &self.max_refresh_tokens)
            .field("refresh_rotation", &self.refresh_rotation)
            .field("password_reset_expiry", &self.password_reset_expiry)
            .field("login_max_attempts", &self.login_max_attempts)
            .field("login_window_seconds", &self.login_window_seconds)
            .field("expose_reset_token", &self.expose_reset_token)
            .field("bind_address", &self.bind_address)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Configuration with default lifetimes and limits for the given secrets.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            max_refresh_tokens: 5,
            refresh_rotation: RefreshRotation::SingleUse,
            password_reset_expiry: 600,
            login_max_attempts: 5,
            login_window_seconds: 900,
            expose_reset_token: false,
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }

    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_ACCESS_SECRET`: HMAC secret for access tokens (required)
    /// - `JWT_REFRESH_SECRET`: HMAC secret for refresh tokens (required, distinct)
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    /// - `MAX_REFRESH_TOKENS`: Refresh tokens kept per user (default: 5)
    /// - `REFRESH_ROTATION`: `single_use` (default) or `sliding_window`
    /// - `PASSWORD_RESET_EXPIRY`: Reset token expiry in seconds (default: 600)
    /// - `LOGIN_MAX_ATTEMPTS`: Failed logins per window (default: 5)
    /// - `LOGIN_WINDOW_SECONDS`: Failed login window in seconds (default: 900)
    /// - `EXPOSE_RESET_TOKEN`: Echo reset tokens in responses (default: false)
    /// - `BIND_ADDRESS`: Listen address (default: 0.0.0.0:3000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("jwt_access_token_expiry", 900_i64)?
            .set_default("jwt_refresh_token_expiry", 604_800_i64)?
            .set_default("max_refresh_tokens", 5_i64)?
            .set_default("refresh_rotation", "single_use")?
            .set_default("password_reset_expiry", 600_i64)?
            .set_default("login_max_attempts", 5_i64)?
            .set_default("login_window_seconds", 900_i64)?
            .set_default("expose_reset_token", false)?
            .set_default("bind_address", "0.0.0.0:3000")?
            .add_source(Environment::default())
            .build()?;

        let access_secret = settings
            .get_string("jwt_access_secret")
            .map_err(|_| ConfigError::Missing("JWT_ACCESS_SECRET"))?;
        let refresh_secret = settings
            .get_string("jwt_refresh_secret")
            .map_err(|_| ConfigError::Missing("JWT_REFRESH_SECRET"))?;

        let config = AuthConfig {
            access_secret,
            refresh_secret,
            access_token_expiry: settings.get::<u64>("jwt_access_token_expiry")?,
            refresh_token_expiry: settings.get::<u64>("jwt_refresh_token_expiry")?,
            max_refresh_tokens: settings.get::<usize>("max_refresh_tokens")?,
            refresh_rotation: settings.get_string("refresh_rotation")?.parse()?,
            password_reset_expiry: settings.get::<u64>("password_reset_expiry")?,
            login_max_attempts: settings.get::<u32>("login_max_attempts")?,
            login_window_seconds: settings.get::<u64>("login_window_seconds")?,
            expose_reset_token: settings.get_bool("expose_reset_token")?,
            bind_address: settings.get_string("bind_address")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the token scheme cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_ACCESS_SECRET"));
        }
        if self.refresh_secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_REFRESH_SECRET"));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if self.max_refresh_tokens == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_REFRESH_TOKENS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.access_token_expiry == 0 || self.refresh_token_expiry == 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_*_TOKEN_EXPIRY",
                reason: "token lifetimes must be positive".to_string(),
            });
        }
        Ok(())
    }
}
