//! Helpers for black-box tests against a running backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo run -p cheap-electra-backend &
//! CE_STAFF_USERNAME=staff CE_STAFF_PASSWORD=... \
//!   cargo test -p cheap-electra-integration-tests -- --ignored
//! ```
//!
//! Every test registers its own users with unique names, so tests can run
//! in parallel against a shared database.

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Base URL of the backend under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("BACKEND_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Absolute URL for `path`.
#[must_use]
pub fn url(path: &str) -> String {
    format!("{}{path}", base_url())
}

/// A client that keeps the session cookie between requests.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// A username no other test uses.
#[must_use]
pub fn unique_username(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Register a fresh user and log `client` in as them. Returns the user JSON.
pub async fn register_and_login(client: &Client) -> Value {
    let username = unique_username("user");
    let password = "correct-horse-battery";

    let resp = client
        .post(url("/api/users/"))
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": password,
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);

    login(client, &username, password).await
}

/// Log `client` in. Returns the user JSON.
pub async fn login(client: &Client, username: &str, password: &str) -> Value {
    let resp = client
        .post(url("/api/users/login/"))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.expect("Invalid login response")
}

/// Log `client` in as the staff account named by `CE_STAFF_USERNAME` and
/// `CE_STAFF_PASSWORD`.
pub async fn login_staff(client: &Client) -> Value {
    let username = std::env::var("CE_STAFF_USERNAME").expect("CE_STAFF_USERNAME not set");
    let password = std::env::var("CE_STAFF_PASSWORD").expect("CE_STAFF_PASSWORD not set");
    login(client, &username, &password).await
}

/// Create a product as the logged-in `client` and return its JSON.
pub async fn create_product(client: &Client, body: Option<Value>) -> Value {
    let request = client.post(url("/api/products/create/"));
    let request = match body {
        Some(body) => request.json(&body),
        None => request,
    };
    let resp = request.send().await.expect("Failed to create product");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.expect("Invalid product response")
}
