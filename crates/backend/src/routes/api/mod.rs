//! JSON API route handlers.
//!
//! Request and response bodies use camelCase keys. Extractor failures are
//! reported through [`AppError`] so every error body has the same shape.

pub mod orders;
pub mod products;
pub mod users;

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts},
    response::Redirect,
    routing::get,
};

use cheap_electra_core::UserId;

use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::models::User;
use crate::state::AppState;

/// `Json` extractor rejecting with an [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Path` extractor rejecting with an [`AppError`] (404 for unparseable IDs).
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Load the account behind a session.
///
/// Sessions outlive deleted accounts, so handlers that write rows owned by
/// the caller check the account first.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the user has been deleted.
pub(crate) async fn existing_user(state: &AppState, id: UserId) -> Result<User> {
    UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))
}

/// The bare API root points clients at the product catalog.
async fn api_root() -> Redirect {
    Redirect::to("/api/products/")
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/", get(api_root))
        .merge(products::routes())
        .merge(users::routes())
        .merge(orders::routes())
}
