//! Role model and the privilege ordering every authorization check uses

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Privilege level of a user.
///
/// Variants are declared lowest first, so the derived `Ord` is the
/// hierarchy: `User < Moderator < Admin`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

/// Returned when a role name is not one of the three known values
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown role '{0}', expected one of: user, moderator, admin")]
pub struct UnknownRole(pub String);

impl Role {
    /// All roles, lowest privilege first.
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    /// Numeric rank in the hierarchy.
    pub fn rank(self) -> u8 {
        match self {
            Role::User => 1,
            Role::Moderator => 2,
            Role::Admin => 3,
        }
    }

    /// Whether this role grants everything `other` grants.
    pub fn includes(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
