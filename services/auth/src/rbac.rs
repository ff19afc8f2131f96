//! Role authorizer

use thiserror::Error;

use crate::models::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Access denied. Required roles: {required}")]
    Forbidden { required: String },
}

/// Roles that satisfy `minimum`, lowest rank first
fn admitted(minimum: Role) -> String {
    Role::ALL
        .iter()
        .filter(|role| role.includes(minimum))
        .map(|role| role.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pure decision: `role` passes when it ranks at or above `minimum`.
pub fn authorize(role: Role, minimum: Role) -> Result<(), AuthzError> {
    if role.includes(minimum) {
        return Ok(());
    }
    Err(AuthzError::Forbidden {
        required: admitted(minimum),
    })
}
