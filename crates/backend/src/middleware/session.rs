//! Session middleware configuration.
//!
//! Sessions are stored server-side; the cookie only carries the session ID.
//! The server uses the `PostgreSQL` store, tests use the in-memory store.

use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "ce_session";

/// Session expiry time in seconds (14 days).
const SESSION_EXPIRY_SECONDS: i64 = 14 * 24 * 60 * 60;

/// Create the session layer over `store`.
///
/// # Arguments
///
/// * `store` - Session store (`PostgresStore` in production)
/// * `is_secure` - Whether the cookie gets the `Secure` attribute (HTTPS deployments)
#[must_use]
pub fn create_session_layer<S>(store: S, is_secure: bool) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
