//! User API route handlers.
//!
//! ```text
//! POST   /api/users/                  - Register (201)
//! GET    /api/users/                  - List users (staff)
//! POST   /api/users/login/            - Log in (rate limited)
//! POST   /api/users/logout/           - Log out (204)
//! GET    /api/users/profile/          - Current user
//! PUT    /api/users/profile/update/   - Update current user
//! GET    /api/users/{id}/             - Get user (staff)
//! PUT    /api/users/update/{id}/      - Update user (staff)
//! DELETE /api/users/delete/{id}/      - Delete user (staff)
//! ```

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use cheap_electra_core::{Email, UserId};

use super::{ApiJson, ApiPath};
use crate::db::users::UserRepository;
use crate::error::{AppError, FieldErrors, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, RequireStaff, auth_rate_limiter, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User, UserChanges};
use crate::services::auth::{AuthService, ProfileUpdate, Registration};
use crate::state::AppState;

// =============================================================================
// Views
// =============================================================================

/// User as serialized by the API. Never includes the password hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    /// Empty when no email is on file.
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.to_string(),
            email: user
                .email
                .as_ref()
                .map(|e| e.as_str().to_string())
                .unwrap_or_default(),
            name: user.display_name().to_string(),
            is_admin: user.is_staff,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
            name: req.name,
        }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Self-service profile update body.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Staff update of another user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
}

impl UserUpdateRequest {
    /// Validate into repository changes.
    fn into_changes(self) -> std::result::Result<UserChanges, FieldErrors> {
        let email = match self.email.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Email::parse(raw).map_err(|_| {
                FieldErrors::single("email", "Enter a valid email address.")
            })?),
        };

        Ok(UserChanges {
            first_name: self.name,
            email,
            is_staff: self.is_admin,
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a new account.
#[instrument(skip(state, req))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>)> {
    let user = AuthService::new(state.pool())
        .register(&req.into(), false)
        .await?;

    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// Log in and start a session.
#[instrument(skip(state, session, req), fields(username = %req.username))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<UserView>> {
    let user = AuthService::new(state.pool())
        .login(&req.username, &req.password)
        .await?;

    set_current_user(&session, &CurrentUser::from(&user))
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    set_sentry_user(&user.id, user.username.as_str());

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(UserView::from(&user)))
}

/// End the session. Succeeds whether or not anyone was logged in.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();

    Ok(StatusCode::NO_CONTENT)
}

/// The logged-in user's profile.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<UserView>> {
    let user = AuthService::new(state.pool()).get_user(current.id).await?;
    Ok(Json(UserView::from(&user)))
}

/// Update the logged-in user's name, email or password.
#[instrument(skip(state, current, req), fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(req): ApiJson<ProfileUpdateRequest>,
) -> Result<Json<UserView>> {
    let update = ProfileUpdate {
        name: req.name,
        email: req.email,
        password: req.password,
    };
    let user = AuthService::new(state.pool())
        .update_profile(current.id, &update)
        .await?;

    Ok(Json(UserView::from(&user)))
}

/// List all users.
#[instrument(skip(state, _staff))]
pub async fn list_users(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
) -> Result<Json<Vec<UserView>>> {
    let users = UserRepository::new(state.pool()).list_all().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

/// Get one user.
#[instrument(skip(state, _staff))]
pub async fn get_user(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserView>> {
    let user = UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserView::from(&user)))
}

/// Update another user's name, email or staff flag.
#[instrument(skip(state, staff, req), fields(staff_id = %staff.id))]
pub async fn update_user(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(req): ApiJson<UserUpdateRequest>,
) -> Result<Json<UserView>> {
    let changes = req.into_changes()?;
    let user = UserRepository::new(state.pool())
        .update(id, &changes)
        .await?;

    tracing::info!(user_id = %id, is_staff = user.is_staff, "User updated by staff");

    Ok(Json(UserView::from(&user)))
}

/// Delete a user. Their orders and reviews are kept.
#[instrument(skip(state, staff), fields(staff_id = %staff.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<UserId>,
) -> Result<StatusCode> {
    if !UserRepository::new(state.pool()).delete(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Create the user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/", get(list_users).post(register))
        .route("/api/users/login/", post(login).layer(auth_rate_limiter()))
        .route("/api/users/logout/", post(logout))
        .route("/api/users/profile/", get(profile))
        .route("/api/users/profile/update/", put(update_profile))
        .route("/api/users/{id}/", get(get_user))
        .route("/api/users/update/{id}/", put(update_user))
        .route("/api/users/delete/{id}/", delete(delete_user))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cheap_electra_core::Username;

    fn user(first_name: &str, email: Option<&str>, is_staff: bool) -> User {
        User {
            id: UserId::new(7),
            username: Username::parse("testuser").unwrap(),
            email: email.map(|e| Email::parse(e).unwrap()),
            first_name: first_name.to_string(),
            is_staff,
            is_active: true,
            last_login: None,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn test_user_view_json() {
        let view = UserView::from(&user("Test User", Some("test@example.com"), true));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "username": "testuser",
                "email": "test@example.com",
                "name": "Test User",
                "isAdmin": true,
            })
        );
    }

    #[test]
    fn test_user_view_defaults() {
        let view = UserView::from(&user("", None, false));
        assert_eq!(view.email, "");
        assert_eq!(view.name, "testuser");
        assert!(!view.is_admin);
    }

    #[test]
    fn test_update_request_validates_email() {
        let req = UserUpdateRequest {
            name: None,
            email: Some("broken".to_string()),
            is_admin: Some(true),
        };
        let errors = req.into_changes().unwrap_err();
        assert!(errors.get("email").is_some());

        let req = UserUpdateRequest {
            name: Some("New Name".to_string()),
            email: Some(" ".to_string()),
            is_admin: None,
        };
        let changes = req.into_changes().unwrap();
        assert_eq!(changes.first_name.as_deref(), Some("New Name"));
        assert!(changes.email.is_none());
        assert!(changes.is_staff.is_none());
    }
}
