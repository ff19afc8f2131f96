//! Security event log
//!
//! Login outcomes, token revocations and privileged changes are reported
//! through [`SecurityEventSink`]. Recording is best-effort: a sink never
//! returns an error and never fails the request that produced the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    LoginSuccess,
    LoginFailed,
    LoginBruteforceBlocked,
    Logout,
    LogoutAll,
    RefreshToken,
    RefreshTokenReuse,
    TokenExpired,
    InvalidToken,
    TokenRevoked,
    PasswordResetRequest,
    PasswordReset,
    PasswordChange,
    ProfileUpdate,
    AccountDeleted,
    UserDeleted,
    RoleUpdated,
    StatusUpdated,
}

impl SecurityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityAction::LoginSuccess => "login_success",
            SecurityAction::LoginFailed => "login_failed",
            SecurityAction::LoginBruteforceBlocked => "login_bruteforce_blocked",
            SecurityAction::Logout => "logout",
            SecurityAction::LogoutAll => "logout_all",
            SecurityAction::RefreshToken => "refresh_token",
            SecurityAction::RefreshTokenReuse => "refresh_token_reuse",
            SecurityAction::TokenExpired => "token_expired",
            SecurityAction::InvalidToken => "invalid_token",
            SecurityAction::TokenRevoked => "token_revoked",
            SecurityAction::PasswordResetRequest => "password_reset_request",
            SecurityAction::PasswordReset => "password_reset",
            SecurityAction::PasswordChange => "password_change",
            SecurityAction::ProfileUpdate => "profile_update",
            SecurityAction::AccountDeleted => "account_deleted",
            SecurityAction::UserDeleted => "user_deleted",
            SecurityAction::RoleUpdated => "role_updated",
            SecurityAction::StatusUpdated => "status_updated",
        }
    }

    /// Failures and blocked attempts are logged at warn level.
    pub fn is_alert(self) -> bool {
        matches!(
            self,
            SecurityAction::LoginFailed
                | SecurityAction::LoginBruteforceBlocked
                | SecurityAction::RefreshTokenReuse
                | SecurityAction::InvalidToken
                | SecurityAction::TokenRevoked
        )
    }
}

/// A single security-relevant occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub action: SecurityAction,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub client: Option<String>,
    /// Machine-readable reason code, e.g. `invalid_password`
    pub reason: Option<&'static str>,
    /// User the action was applied to, for administrative actions
    pub target_user_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(action: SecurityAction) -> Self {
        Self {
            action,
            user_id: None,
            email: None,
            client: None,
            reason: None,
            target_user_id: None,
            at: Utc::now(),
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn client(mut self, client: Option<&str>) -> Self {
        self.client = client.map(str::to_string);
        self
    }

    pub fn reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn target(mut self, user_id: Uuid) -> Self {
        self.target_user_id = Some(user_id);
        self
    }
}

/// Destination for security events
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

pub type SharedSecuritySink = Arc<dyn SecurityEventSink>;

/// Writes events as structured `tracing` records on the `security` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSecurityLog;

impl SecurityEventSink for TracingSecurityLog {
    fn record(&self, event: SecurityEvent) {
        let action = event.action.as_str();
        let user_id = event.user_id.map(|id| id.to_string());
        let target = event.target_user_id.map(|id| id.to_string());

        if event.action.is_alert() {
            warn!(
                target: "security",
                action,
                user_id = user_id.as_deref(),
                email = event.email.as_deref(),
                client = event.client.as_deref(),
                reason = event.reason,
                target_user_id = target.as_deref(),
                "security event"
            );
        } else {
            info!(
                target: "security",
                action,
                user_id = user_id.as_deref(),
                email = event.email.as_deref(),
                client = event.client.as_deref(),
                reason = event.reason,
                target_user_id = target.as_deref(),
                "security event"
            );
        }
    }
}

/// Keeps events in memory; used by tests and local tooling.
#[derive(Debug, Default)]
pub struct InMemorySecurityLog {
    events: Mutex<Vec<SecurityEvent>>,
}

impl InMemorySecurityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<SecurityAction> {
        self.events().into_iter().map(|event| event.action).collect()
    }
}

impl SecurityEventSink for InMemorySecurityLog {
    fn record(&self, event: SecurityEvent) {
        // a poisoned lock only loses the event
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_fields() {
        let id = Uuid::new_v4();
        let event = SecurityEvent::new(SecurityAction::LoginFailed)
            .user(id)
            .email("ann@x.com")
            .client(Some("10.0.0.1"))
            .reason("invalid_password");

        assert_eq!(event.user_id, Some(id));
        assert_eq!(event.email.as_deref(), Some("ann@x.com"));
        assert_eq!(event.client.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.reason, Some("invalid_password"));
    }

    #[test]
    fn in_memory_log_keeps_order() {
        let log = InMemorySecurityLog::new();
        log.record(SecurityEvent::new(SecurityAction::LoginSuccess));
        log.record(SecurityEvent::new(SecurityAction::LogoutAll));

        assert_eq!(
            log.actions(),
            vec![SecurityAction::LoginSuccess, SecurityAction::LogoutAll]
        );
    }

    #[test]
    fn tracing_log_never_panics_without_subscriber() {
        TracingSecurityLog.record(SecurityEvent::new(SecurityAction::TokenRevoked).reason("logout_all"));
    }

    #[test]
    fn action_names_match_serde() {
        let json = serde_json::to_string(&SecurityAction::LoginBruteforceBlocked).unwrap();
        assert_eq!(json, format!("\"{}\"", SecurityAction::LoginBruteforceBlocked.as_str()));
    }
}
