//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Error bodies are JSON: `{"detail": "<message>"}`, or for validation
//! failures a map of field name to messages (`{"email": ["..."]}`).

use std::collections::BTreeMap;
use std::fmt;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;

/// Validation messages keyed by request field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// An empty set of errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single message for a single field.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` if any field has a message.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Application-level error type for the backend.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Request fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed to do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

// Path parameters only fail to parse when the URL names no real resource
impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        Self::NotFound("Not found".to_string())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

/// What the client sees for an error.
enum ErrorBody {
    Detail(String),
    Fields(FieldErrors),
}

impl AppError {
    /// Whether this error is our fault rather than the client's.
    fn is_server_error(&self) -> bool {
        match self {
            Self::Internal(_) => true,
            Self::Database(err) => is_server_repository_error(err),
            Self::Auth(err) => match err {
                AuthError::PasswordHash => true,
                AuthError::Repository(err) => is_server_repository_error(err),
                _ => false,
            },
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::InactiveUser => StatusCode::UNAUTHORIZED,
                AuthError::UsernameTaken
                | AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::InvalidRegistration(_) => StatusCode::BAD_REQUEST,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Don't expose internal error details to clients
    fn body(self) -> ErrorBody {
        if self.is_server_error() {
            return ErrorBody::Detail("Internal server error".to_string());
        }

        match self {
            Self::Validation(errors) => ErrorBody::Fields(errors),
            Self::Database(err) | Self::Auth(AuthError::Repository(err)) => {
                ErrorBody::Detail(repository_message(err))
            }
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::InactiveUser => ErrorBody::Detail(
                    "No active account found with the given credentials".to_string(),
                ),
                AuthError::UsernameTaken => ErrorBody::Fields(FieldErrors::single(
                    "username",
                    "A user with that username already exists.",
                )),
                AuthError::WeakPassword(msg) => ErrorBody::Fields(FieldErrors::single("password", msg)),
                AuthError::InvalidEmail(_) => ErrorBody::Fields(FieldErrors::single(
                    "email",
                    "Enter a valid email address.",
                )),
                AuthError::InvalidRegistration(errors) => ErrorBody::Fields(errors),
                AuthError::UserNotFound => ErrorBody::Detail("User not found".to_string()),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    ErrorBody::Detail("Internal server error".to_string())
                }
            },
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Internal(msg) => ErrorBody::Detail(msg),
            Self::RateLimited => {
                ErrorBody::Detail("Too many requests, please try again later".to_string())
            }
        }
    }
}

const fn is_server_repository_error(err: &RepositoryError) -> bool {
    matches!(
        err,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_)
    )
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::BAD_REQUEST,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn repository_message(err: RepositoryError) -> String {
    match err {
        RepositoryError::NotFound => "Not found".to_string(),
        RepositoryError::Conflict(msg) => msg,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            "Internal server error".to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        match self.body() {
            ErrorBody::Detail(detail) => (status, Json(json!({ "detail": detail }))).into_response(),
            ErrorBody::Fields(errors) => (status, Json(errors)).into_response(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("order", "Placed order", Some(&[("order_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Product not found".to_string());
        assert_eq!(err.to_string(), "Not found: Product not found");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Conflict("dup".to_string()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::InvalidCredentials)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::UsernameTaken)),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_detail_body() {
        let (status, body) = body_json(AppError::NotFound("Order not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Order not found" }));
    }

    #[tokio::test]
    async fn test_field_errors_body() {
        let mut errors = FieldErrors::new();
        errors.add("email", "Enter a valid email address.");
        errors.add("password", "too short");
        errors.add("password", "too common");

        let (status, body) = body_json(AppError::Validation(errors)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "email": ["Enter a valid email address."],
                "password": ["too short", "too common"],
            })
        );
    }

    #[tokio::test]
    async fn test_username_taken_is_field_error() {
        let (_, body) = body_json(AppError::Auth(AuthError::UsernameTaken)).await;
        assert_eq!(
            body,
            json!({ "username": ["A user with that username already exists."] })
        );
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".to_string()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "detail": "Internal server error" }));
    }

    #[test]
    fn test_field_errors_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());
        let errors = FieldErrors::single("name", "required");
        assert_eq!(errors.get("name"), Some(&["required".to_string()][..]));
        assert_eq!(errors.to_string(), "name: required");
        assert!(errors.into_result().is_err());
    }
}
