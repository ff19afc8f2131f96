//! Rate limiter for preventing brute force login attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::AuthConfig;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failed attempts allowed inside one window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 900,       // 15 minutes
            ban_duration_seconds: 900, // 15 minutes
        }
    }
}

impl From<&AuthConfig> for RateLimiterConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            max_attempts: config.login_max_attempts,
            window_seconds: config.login_window_seconds,
            ban_duration_seconds: config.login_window_seconds,
        }
    }
}

/// Failures recorded between two sweeps of lapsed entries
const SWEEP_INTERVAL: u32 = 1024;

#[derive(Debug)]
struct RateLimiterEntry {
    failures: u32,
    window_started: Instant,
    ban_expires: Option<Instant>,
}

impl RateLimiterEntry {
    /// Neither banned nor inside a live window
    fn is_lapsed(&self, now: Instant, window: Duration) -> bool {
        let banned = self.ban_expires.is_some_and(|expires| now < expires);
        !banned && now.duration_since(self.window_started) >= window
    }
}

#[derive(Debug, Default)]
struct Entries {
    by_key: HashMap<String, RateLimiterEntry>,
    since_sweep: u32,
}

impl Entries {
    fn sweep(&mut self, now: Instant, window: Duration) {
        let before = self.by_key.len();
        self.by_key.retain(|_, entry| !entry.is_lapsed(now, window));
        self.since_sweep = 0;
        debug!(
            "Rate limiter sweep dropped {} entries",
            before - self.by_key.len()
        );
    }
}

/// Failed-login counter keyed by caller and account
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<Entries>>,
}

/// Key a login attempt by client address and normalized email.
pub fn login_key(client: Option<&str>, email: &str) -> String {
    format!("{}|{}", client.unwrap_or("unknown"), email)
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    /// Whether an attempt under `key` may proceed
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let ban_expires = match entries.by_key.get(key) {
            Some(entry) => entry.ban_expires,
            None => return true,
        };

        match ban_expires {
            Some(ban_expires) if now < ban_expires => false,
            Some(_) => {
                // Ban expired
                entries.by_key.remove(key);
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt. Returns true when this failure triggers a ban.
    pub async fn record_failure(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        entries.since_sweep += 1;
        if entries.since_sweep >= SWEEP_INTERVAL {
            entries.sweep(now, window);
        }

        let entry = entries.by_key.entry(key.to_string()).or_insert(RateLimiterEntry {
            failures: 0,
            window_started: now,
            ban_expires: None,
        });

        if now.duration_since(entry.window_started) >= window {
            entry.failures = 0;
            entry.window_started = now;
            entry.ban_expires = None;
        }

        entry.failures += 1;
        if entry.failures >= self.config.max_attempts && entry.ban_expires.is_none() {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return true;
        }
        false
    }

    /// Forget the history of `key`, e.g. after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.by_key.remove(key);
    }
}
