//! Backend configuration loaded from environment variables.
//!
//! The configuration is read once at startup and handed to [`AppState`] and
//! the router; nothing reads the environment after that.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BACKEND_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `BACKEND_HOST` - Bind address (default: 127.0.0.1)
//! - `BACKEND_PORT` - Listen port (default: 8000)
//! - `BACKEND_BASE_URL` - Public URL (default: <http://localhost:8000>)
//! - `BACKEND_DEBUG` - Development mode, `true` or `false` (default: false)
//! - `BACKEND_BASE_DIR` - Project directory for production asset paths (default: .)
//! - `BACKEND_MEDIA_URL` - URL prefix for uploaded media (default: /images/)
//! - `BACKEND_MEDIA_ROOT` - Upload directory (default: `<base_dir>/static/images`)
//! - `BACKEND_STATIC_URL` - URL prefix for static assets (default: /static/)
//! - `BACKEND_STATIC_ROOT` - Static asset directory (default: `<base_dir>/staticfiles`)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//!
//! [`AppState`]: crate::state::AppState

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Backend application configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Development mode: serve assets from the configured roots
    pub debug: bool,
    /// Static and media file locations
    pub assets: AssetsConfig,
    /// Emit JSON logs instead of text
    pub json_logs: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Where static assets and uploaded media live, and the URLs they are served under.
#[derive(Debug, Clone)]
pub struct AssetsConfig {
    /// Project directory; production asset paths are resolved against it
    pub base_dir: PathBuf,
    /// URL prefix for uploaded media (e.g. `/images/`)
    pub media_url: String,
    /// Directory uploaded media is written to
    pub media_root: PathBuf,
    /// URL prefix for static assets (e.g. `/static/`)
    pub static_url: String,
    /// Directory static assets are collected into
    pub static_root: PathBuf,
}

impl AssetsConfig {
    /// Asset configuration rooted at `base_dir` with the default URL prefixes.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            media_url: "/images/".to_string(),
            media_root: base_dir.join("static").join("images"),
            static_url: "/static/".to_string(),
            static_root: base_dir.join("staticfiles"),
            base_dir,
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::with_base_dir(get_env_or_default("BACKEND_BASE_DIR", "."));

        let media_url = get_optional_env("BACKEND_MEDIA_URL").unwrap_or(defaults.media_url);
        validate_url_prefix("BACKEND_MEDIA_URL", &media_url)?;
        let static_url = get_optional_env("BACKEND_STATIC_URL").unwrap_or(defaults.static_url);
        validate_url_prefix("BACKEND_STATIC_URL", &static_url)?;

        Ok(Self {
            media_url,
            media_root: get_optional_env("BACKEND_MEDIA_ROOT")
                .map_or(defaults.media_root, PathBuf::from),
            static_url,
            static_root: get_optional_env("BACKEND_STATIC_ROOT")
                .map_or(defaults.static_root, PathBuf::from),
            base_dir: defaults.base_dir,
        })
    }
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("BACKEND_DATABASE_URL")?;
        let host = get_env_or_default("BACKEND_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BACKEND_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("BACKEND_PORT", "8000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("BACKEND_PORT".to_string(), e.to_string()))?;
        let base_url = get_env_or_default("BACKEND_BASE_URL", "http://localhost:8000");
        let debug = parse_bool("BACKEND_DEBUG", &get_env_or_default("BACKEND_DEBUG", "false"))?;
        let assets = AssetsConfig::from_env()?;
        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            debug,
            assets,
            json_logs,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a boolean flag the way operators tend to write them.
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected true or false, got '{other}'"),
        )),
    }
}

/// Asset URL prefixes must be absolute and cannot shadow the whole site.
fn validate_url_prefix(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') || value.trim_matches('/').is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be an absolute path below '/', got '{value}'"),
        ));
    }
    Ok(())
}
