//! CLI command implementations.

pub mod dumpdata;
pub mod migrate;
pub mod users;

use secrecy::SecretString;
use sqlx::PgPool;

use cheap_electra_backend::db;

/// Errors shared by commands that need the database.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read the backend database URL, falling back to `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("BACKEND_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("BACKEND_DATABASE_URL"))
}

/// Connect to the backend database.
pub async fn connect() -> Result<PgPool, CommandError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
