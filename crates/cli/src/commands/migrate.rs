//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! ce-cli migrate
//! ```
//!
//! Applies `crates/backend/migrations/` (schema `shop`) and creates the
//! session table used by the backend's session store.

use tower_sessions_sqlx_store::PostgresStore;

use super::{CommandError, connect};

/// Errors that can occur while migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Session store migration error: {0}")]
    SessionStore(#[from] sqlx::Error),
}

/// Run all backend migrations.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running backend migrations...");
    sqlx::migrate!("../backend/migrations").run(&pool).await?;

    tracing::info!("Creating session table...");
    PostgresStore::new(pool.clone()).migrate().await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
