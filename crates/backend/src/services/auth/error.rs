//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::error::FieldErrors;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account exists but has been deactivated.
    #[error("user is inactive")]
    InactiveUser,

    /// Username is already registered.
    #[error("username already taken")]
    UsernameTaken,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] cheap_electra_core::EmailError),

    /// One or more registration fields are missing or invalid.
    #[error("invalid registration: {0}")]
    InvalidRegistration(FieldErrors),

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
