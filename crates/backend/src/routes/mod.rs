//! HTTP route handlers for the backend.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                  - Landing page
//! GET  /health            - Liveness check
//! GET  /health/ready      - Readiness check (database)
//! GET  /admin/            - Staff overview (entity counts)
//! GET  /api/              - Redirect to /api/products/
//!
//! /api/products/...       - See [`api::products`]
//! /api/users/...          - See [`api::users`]
//! /api/orders/...         - See [`api::orders`]
//!
//! /static/, /media/       - Static files and uploads (see [`assets`])
//! ```
//!
//! Paths are registered with their trailing slash, which is canonical.

pub mod admin;
pub mod api;
pub mod assets;
pub mod home;

use axum::{
    Router,
    extract::State,
    http::{Request, Response, StatusCode},
    middleware::from_fn,
    routing::get,
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::Span;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create all page and API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/admin/", get(admin::overview))
        .merge(api::routes())
}

/// Build the complete application: routes, health checks, static files and
/// the middleware stack.
///
/// The session store is passed in so the server can use `PostgreSQL` and
/// tests an in-memory store.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let config = state.config();
    let mounts = assets::static_mounts(config.debug, &config.assets);

    let router = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes());

    assets::mount_static(router, &mounts)
        .layer(session_layer)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &Response<_>, latency: std::time::Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use axum::body::{Body, to_bytes};
    use axum::http::header;
    use secrecy::SecretString;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;
    use tower_sessions::cookie::time::{Duration, OffsetDateTime};
    use tower_sessions::session::{Id, Record};

    use cheap_electra_core::{UserId, Username};

    use super::*;
    use crate::config::{AssetsConfig, BackendConfig};
    use crate::db::users::UserRepository;
    use crate::middleware::create_session_layer;
    use crate::middleware::session::SESSION_COOKIE_NAME;
    use crate::models::{CurrentUser, session_keys};
    use crate::services::auth::{AuthService, Registration};

    struct TestApp {
        router: Router,
        store: MemoryStore,
    }

    impl TestApp {
        fn new(assets: AssetsConfig, debug: bool) -> Self {
            // Never connects unless a handler reaches the database.
            let pool = PgPoolOptions::new()
                .acquire_timeout(std::time::Duration::from_millis(200))
                .connect_lazy("postgres://localhost:1/unused")
                .unwrap();
            Self::with_pool(pool, assets, debug)
        }

        fn with_pool(pool: PgPool, assets: AssetsConfig, debug: bool) -> Self {
            let config = BackendConfig {
                database_url: SecretString::from("postgres://localhost/unused"),
                host: "127.0.0.1".parse().unwrap(),
                port: 8000,
                base_url: "http://localhost:8000".to_string(),
                debug,
                assets,
                json_logs: false,
                sentry_dsn: None,
                sentry_environment: None,
            };
            let store = MemoryStore::default();
            let router = app(
                AppState::new(config, pool),
                create_session_layer(store.clone(), false),
            );
            Self { router, store }
        }

        fn default_app() -> Self {
            Self::new(AssetsConfig::with_base_dir("/nonexistent"), false)
        }

        /// Store a logged-in session and return its cookie.
        async fn login_as(&self, id: i32, username: &str, is_staff: bool) -> String {
            let user = CurrentUser {
                id: UserId::new(id),
                username: Username::parse(username).unwrap(),
                is_staff,
            };
            let mut record = Record {
                id: Id::default(),
                data: HashMap::from([(
                    session_keys::CURRENT_USER.to_string(),
                    serde_json::to_value(&user).unwrap(),
                )]),
                expiry_date: OffsetDateTime::now_utc() + Duration::hours(1),
            };
            self.store.create(&mut record).await.unwrap();
            format!("{SESSION_COOKIE_NAME}={}", record.id)
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, headers, String::from_utf8(body.to_vec()).unwrap())
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn detail(body: &str) -> String {
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        json["detail"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_landing_page() {
        let app = TestApp::default_app();
        let (status, headers, body) = app.send(get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Ecommerce"));
        assert!(headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::default_app();
        let (status, _, body) = app.send(get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_api_root_redirects_to_products() {
        let app = TestApp::default_app();
        let (status, headers, _) = app.send(get("/api/")).await;

        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "/api/products/");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let app = TestApp::default_app();
        let (status, _, _) = app.send(get("/nope/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_anonymous_product_create_rejected() {
        let app = TestApp::default_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/products/create/")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = app.send(request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(detail(&body), "Authentication credentials were not provided.");
    }

    #[tokio::test]
    async fn test_product_create_validates_before_saving() {
        let app = TestApp::default_app();
        let cookie = app.login_as(1, "staffer", true).await;
        let (status, _, body) = app
            .send(json_request(
                "POST",
                "/api/products/create/",
                Some(&cookie),
                r#"{"price": "-1", "countInStock": 2}"#,
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["price"].is_array());
    }

    #[tokio::test]
    async fn test_staff_only_routes() {
        let app = TestApp::default_app();

        let (status, _, _) = app.send(get("/admin/")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let cookie = app.login_as(2, "shopper", false).await;
        let request = Request::builder()
            .uri("/admin/")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = app.send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            detail(&body),
            "You do not have permission to perform this action."
        );

        let request = Request::builder()
            .uri("/api/users/")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = app.send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_registration_validation() {
        let app = TestApp::default_app();
        let (status, _, body) = app
            .send(json_request(
                "POST",
                "/api/users/",
                None,
                r#"{"username": "", "email": "not-an-email", "password": "12345678"}"#,
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["username"].is_array());
        assert!(json["email"].is_array());
        assert!(json["password"].is_array());
    }

    #[tokio::test]
    async fn test_order_without_items_rejected() {
        let app = TestApp::default_app();
        let cookie = app.login_as(3, "buyer", false).await;
        let (status, _, body) = app
            .send(json_request(
                "POST",
                "/api/orders/add/",
                Some(&cookie),
                r#"{"orderItems": []}"#,
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail(&body), "No order items");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_deleted_user_session_cannot_write(pool: PgPool) {
        let registration = Registration {
            username: Some("gone".to_string()),
            email: Some("gone@example.com".to_string()),
            password: Some("long-enough-password".to_string()),
            name: None,
        };
        let user = AuthService::new(&pool)
            .register(&registration, false)
            .await
            .unwrap();

        let app = TestApp::with_pool(
            pool.clone(),
            AssetsConfig::with_base_dir("/nonexistent"),
            false,
        );
        let cookie = app.login_as(user.id.as_i32(), "gone", false).await;
        assert!(UserRepository::new(&pool).delete(user.id).await.unwrap());

        let (status, _, body) = app
            .send(json_request("POST", "/api/products/create/", Some(&cookie), ""))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(detail(&body), "User no longer exists");

        let order = r#"{
            "orderItems": [{"product": 1, "qty": 1}],
            "shippingAddress": {"address": "1 Main St", "city": "Springfield", "postalCode": "12345", "country": "US"},
            "paymentMethod": "PayPal",
            "taxPrice": "0",
            "shippingPrice": "0",
            "totalPrice": "10.00"
        }"#;
        let (status, _, body) = app
            .send(json_request("POST", "/api/orders/add/", Some(&cookie), order))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(detail(&body), "User no longer exists");
    }

    #[tokio::test]
    async fn test_review_rating_checked() {
        let app = TestApp::default_app();
        let cookie = app.login_as(3, "buyer", false).await;
        let (status, _, _) = app
            .send(json_request(
                "POST",
                "/api/products/1/reviews/",
                Some(&cookie),
                r#"{"rating": 9, "comment": "!"}"#,
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_id_is_404() {
        let app = TestApp::default_app();
        let (status, _, _) = app.send(get("/api/products/abc/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logout_without_session() {
        let app = TestApp::default_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/users/logout/")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = app.send(request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_static_files_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("staticfiles/css")).unwrap();
        std::fs::write(dir.path().join("staticfiles/css/site.css"), "body {}").unwrap();
        std::fs::create_dir_all(dir.path().join("media")).unwrap();
        std::fs::write(dir.path().join("media/phone.jpg"), "jpeg").unwrap();

        let app = TestApp::new(AssetsConfig::with_base_dir(dir.path()), false);

        let (status, _, body) = app.send(get("/static/css/site.css")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body {}");

        let (status, _, body) = app.send(get("/media/phone.jpg")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "jpeg");

        // Debug mode serves uploads from the configured media root instead
        let app = TestApp::new(AssetsConfig::with_base_dir(dir.path()), true);
        let (status, _, _) = app.send(get("/media/phone.jpg")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
