//! Server-side record of an issued refresh token

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One active refresh token in a user's bounded list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenEntry {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenEntry {
    /// Whether the entry is still usable at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
