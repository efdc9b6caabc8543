//! Authentication middleware and extractors.
//!
//! Provides extractors for requiring an authenticated (or staff) user in
//! route handlers. The user identity lives in the server-side session.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};

const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";
const NOT_STAFF: &str = "You do not have permission to perform this action.";

/// Extractor that requires an authenticated user.
///
/// Rejects with 401 if nobody is logged in.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts)
            .await
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized(NOT_AUTHENTICATED.to_string()))
    }
}

/// Extractor that requires a staff user.
///
/// Rejects with 401 if nobody is logged in and 403 if the user is not staff.
pub struct RequireStaff(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)
            .await
            .ok_or_else(|| AppError::Unauthorized(NOT_AUTHENTICATED.to_string()))?;

        if !user.is_staff {
            return Err(AppError::Forbidden(NOT_STAFF.to_string()));
        }

        Ok(Self(user))
    }
}

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    // Set by SessionManagerLayer
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Helper to set the current user in the session (login).
///
/// Cycles the session ID first so a pre-login session cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
