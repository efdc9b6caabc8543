//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! ce-cli createsuperuser -u admin -e admin@example.com -p 'a-long-password'
//! ```

use cheap_electra_backend::services::auth::{AuthError, AuthService, Registration};

use super::{CommandError, connect};

/// Errors that can occur while creating a user.
#[derive(Debug, thiserror::Error)]
pub enum UserCommandError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Create a staff user.
///
/// Runs the same validation as API registration.
///
/// # Returns
///
/// The ID of the created user.
pub async fn create_superuser(
    username: &str,
    email: &str,
    password: &str,
) -> Result<i32, UserCommandError> {
    let pool = connect().await?;

    let registration = Registration {
        username: Some(username.to_owned()),
        email: Some(email.to_owned()),
        password: Some(password.to_owned()),
        name: None,
    };
    let user = AuthService::new(&pool).register(&registration, true).await?;

    tracing::info!(
        "Staff user created successfully! ID: {}, Username: {}",
        user.id,
        user.username
    );

    Ok(user.id.as_i32())
}
