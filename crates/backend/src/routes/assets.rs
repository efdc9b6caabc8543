//! Static asset and uploaded media serving.
//!
//! Which directories are exposed depends on the deployment mode:
//!
//! ```text
//! debug       <media_url>  -> <media_root>
//!             <static_url> -> <static_root>
//! production  /media/      -> <base_dir>/media
//!             /static/     -> <base_dir>/staticfiles
//! ```

use std::path::PathBuf;

use axum::Router;
use tower_http::services::ServeDir;

use crate::config::AssetsConfig;
use crate::state::AppState;

/// A URL prefix served from a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMount {
    /// URL prefix with a leading and trailing slash, e.g. `/static/`.
    pub url_prefix: String,
    /// Directory files are served from.
    pub dir: PathBuf,
}

impl StaticMount {
    fn new(url_prefix: &str, dir: PathBuf) -> Self {
        Self {
            url_prefix: format!("/{}/", url_prefix.trim_matches('/')),
            dir,
        }
    }

    /// Path to nest the file service under (no trailing slash).
    #[must_use]
    pub fn route_path(&self) -> &str {
        self.url_prefix.trim_end_matches('/')
    }
}

/// Compute the static mounts for a deployment mode.
///
/// When two prefixes collide the first mount wins.
#[must_use]
pub fn static_mounts(debug: bool, assets: &AssetsConfig) -> Vec<StaticMount> {
    let candidates = if debug {
        [
            StaticMount::new(&assets.media_url, assets.media_root.clone()),
            StaticMount::new(&assets.static_url, assets.static_root.clone()),
        ]
    } else {
        [
            StaticMount::new("/media/", assets.base_dir.join("media")),
            StaticMount::new("/static/", assets.base_dir.join("staticfiles")),
        ]
    };

    let mut mounts: Vec<StaticMount> = Vec::with_capacity(candidates.len());
    for mount in candidates {
        if mounts.iter().any(|m| m.url_prefix == mount.url_prefix) {
            tracing::warn!(prefix = %mount.url_prefix, "Duplicate static prefix ignored");
            continue;
        }
        mounts.push(mount);
    }
    mounts
}

/// URL prefix uploaded media is served under (`/images/`, `/media/`).
#[must_use]
pub fn media_url_prefix(debug: bool, assets: &AssetsConfig) -> String {
    if debug {
        StaticMount::new(&assets.media_url, PathBuf::new()).url_prefix
    } else {
        "/media/".to_string()
    }
}

/// URL prefix static assets are served under.
#[must_use]
pub fn static_url_prefix(debug: bool, assets: &AssetsConfig) -> String {
    if debug {
        StaticMount::new(&assets.static_url, PathBuf::new()).url_prefix
    } else {
        "/static/".to_string()
    }
}

/// Directory uploads are written to, matching what [`static_mounts`] serves.
#[must_use]
pub fn media_dir(debug: bool, assets: &AssetsConfig) -> PathBuf {
    if debug {
        assets.media_root.clone()
    } else {
        assets.base_dir.join("media")
    }
}

/// Add a file service for each mount.
pub fn mount_static(router: Router<AppState>, mounts: &[StaticMount]) -> Router<AppState> {
    mounts.iter().fold(router, |router, mount| {
        tracing::debug!(prefix = %mount.url_prefix, dir = %mount.dir.display(), "Serving static files");
        router.nest_service(mount.route_path(), ServeDir::new(&mount.dir))
    })
}
