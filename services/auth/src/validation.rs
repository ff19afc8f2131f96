//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }

    if name.chars().count() > 50 {
        return Err("Name cannot exceed 50 characters".to_string());
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Please enter a valid email".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    Ok(())
}
