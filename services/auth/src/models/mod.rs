//! Authentication service models

pub mod refresh_token;
pub mod role;
pub mod user;

// Re-export for convenience
pub use refresh_token::RefreshTokenEntry;
pub use role::{Role, UnknownRole};
pub use user::{HashedPassword, User, UserProfile, normalize_email};
