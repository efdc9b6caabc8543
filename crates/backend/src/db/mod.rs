//! Database operations for the shop `PostgreSQL` database.
//!
//! ## Tables (schema `shop`)
//!
//! - `user`, `user_password` - Accounts and argon2 password hashes
//! - `product`, `review` - Catalog
//! - `order`, `order_item`, `shipping_address` - Orders
//!
//! Sessions live in `tower_sessions.session`, managed by the session store.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/backend/migrations/` and run via:
//! ```bash
//! cargo run -p cheap-electra-cli -- migrate
//! ```
//!
//! Queries are checked at runtime (`sqlx::query_as` with `FromRow` row types),
//! so the workspace builds without a live database.

pub mod orders;
pub mod products;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors returned by repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate username, stock below zero).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a constraint violation to `Conflict`, leaving other errors as `Database`.
    pub(crate) fn from_constraint(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && (db_err.is_unique_violation()
                || db_err.is_check_violation()
                || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
