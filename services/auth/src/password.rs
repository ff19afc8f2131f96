//! Argon2 password hashing and verification

use argon2::{Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier, password_hash::SaltString};
use thiserror::Error;

use crate::models::HashedPassword;

/// Password hashing failures; none of these are the caller's fault.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hashes and verifies passwords with Argon2id and a random salt.
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash a plaintext password.
    pub fn hash(&self, password: &str) -> Result<HashedPassword, PasswordError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string();

        Ok(HashedPassword::from_stored(hash))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// The digest comparison inside argon2 is constant-time. Returns
    /// `Ok(false)` on mismatch and an error only when the stored value is
    /// not a parseable hash.
    pub fn verify(&self, password: &str, hash: &HashedPassword) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash.as_str())
            .map_err(|e| PasswordError::MalformedHash(e.to_string()))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::MalformedHash(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("secret1").unwrap();

        assert!(hash.as_str().starts_with("$argon2"));
        assert_ne!(hash.as_str(), "secret1");
        assert!(hasher.verify("secret1", &hash).unwrap());
        assert!(!hasher.verify("secret2", &hash).unwrap());
    }

    #[test]
    fn same_password_gets_different_salts() {
        let hasher = PasswordHasher::new();
        let a = hasher.hash("secret1").unwrap();
        let b = hasher.hash("secret1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let hasher = PasswordHasher::new();
        let result = hasher.verify("secret1", &HashedPassword::from_stored("plaintext"));
        assert!(matches!(result, Err(PasswordError::MalformedHash(_))));
    }
}
