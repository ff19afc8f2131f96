//! Common library for the Joy Kunga identity service
//!
//! This crate provides the infrastructure shared by the services in the
//! workspace: PostgreSQL connectivity and the error type
//! every record store reports with.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;

pub use database::{DatabaseConfig, health_check, init_pool};
pub use error::{DatabaseError, DatabaseResult};
