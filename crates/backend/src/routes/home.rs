//! Landing page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use chrono::Datelike;
use tracing::instrument;

use super::assets::static_url_prefix;
use crate::state::AppState;

/// Shop name shown in the page title and footer.
pub const SITE_NAME: &str = "CheapElectra";

/// A link to one of the API entry points.
#[derive(Clone)]
pub struct ApiLink {
    pub label: &'static str,
    pub href: &'static str,
}

const API_LINKS: [ApiLink; 3] = [
    ApiLink {
        label: "Products",
        href: "/api/products/",
    },
    ApiLink {
        label: "Top rated",
        href: "/api/products/top/",
    },
    ApiLink {
        label: "My orders",
        href: "/api/orders/myorders/",
    },
];

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub site_name: &'static str,
    /// URL prefix static assets are served under.
    pub static_url: String,
    pub year: i32,
    pub api_links: Vec<ApiLink>,
}

/// Display the landing page.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config();

    IndexTemplate {
        site_name: SITE_NAME,
        static_url: static_url_prefix(config.debug, &config.assets),
        year: chrono::Utc::now().year(),
        api_links: API_LINKS.to_vec(),
    }
}
