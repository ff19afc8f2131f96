//! Custom error types for the common library
//!
//! This module defines the error type shared by every record store in the
//! workspace, whatever engine backs it.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred while applying the schema
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),

    /// A unique constraint rejected the write (e.g. duplicate email)
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A stored row could not be turned back into a domain value
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    /// Classify a query failure, pulling unique violations out of the generic bucket.
    pub fn from_query(err: SqlxError) -> Self {
        match &err {
            SqlxError::Database(db) if db.is_unique_violation() => {
                let constraint = db.constraint().unwrap_or("unique").to_string();
                DatabaseError::UniqueViolation(constraint)
            }
            _ => DatabaseError::Query(err),
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_stay_query_errors() {
        let err = DatabaseError::from_query(SqlxError::RowNotFound);
        assert!(matches!(err, DatabaseError::Query(SqlxError::RowNotFound)));
    }

    #[test]
    fn unique_violation_message_names_constraint() {
        let err = DatabaseError::UniqueViolation("users_email_key".to_string());
        assert_eq!(
            err.to_string(),
            "Unique constraint violated: users_email_key"
        );
    }
}
