//! HTTP middleware stack for the backend.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions, `PostgreSQL` store in production)
//! 5. Rate limiting on login (governor)
//!
//! Authentication is enforced per handler by the extractors in [`auth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{RequireAuth, RequireStaff, clear_current_user, set_current_user};
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
