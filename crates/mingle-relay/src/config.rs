//! Relay configuration loaded from environment variables.
//!
//! Every setting has a default so a local node starts with no
//! configuration. Without an FCM key or mail endpoint the relay logs what
//! it would have sent instead of delivering it.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Legacy FCM HTTP endpoint.
    /// Env: `MINGLE_FCM_ENDPOINT`
    pub fcm_endpoint: String,

    /// FCM server key. Push delivery is disabled without it.
    /// Env: `MINGLE_FCM_SERVER_KEY`
    pub fcm_server_key: Option<String>,

    /// Public site, used for click-through and invitation links.
    /// Env: `MINGLE_SITE_URL`
    /// Default: `http://localhost:5173`
    pub site_url: String,

    /// HTTP endpoint that accepts invitation emails as JSON.
    /// Env: `MINGLE_MAIL_ENDPOINT`
    pub mail_endpoint: Option<String>,

    /// SQLite file of the local node. In-memory when unset.
    /// Env: `MINGLE_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Directory of the local object store.
    /// Env: `MINGLE_OBJECTS_DIR`
    /// Default: `./objects`
    pub objects_dir: PathBuf,

    /// Outbound HTTP timeout.
    pub http_timeout: Duration,

    /// Pause before resubscribing after the change feed drops.
    pub retry_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fcm_endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
            fcm_server_key: None,
            site_url: "http://localhost:5173".to_string(),
            mail_endpoint: None,
            db_path: None,
            objects_dir: PathBuf::from("./objects"),
            http_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = get("MINGLE_FCM_ENDPOINT") {
            config.fcm_endpoint = endpoint;
        }

        config.fcm_server_key = get("MINGLE_FCM_SERVER_KEY").filter(|k| !k.trim().is_empty());

        if let Some(url) = get("MINGLE_SITE_URL") {
            let trimmed = url.trim_end_matches('/');
            if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
                config.site_url = trimmed.to_string();
            } else {
                tracing::warn!(value = %url, "Invalid MINGLE_SITE_URL, using default");
            }
        }

        config.mail_endpoint = get("MINGLE_MAIL_ENDPOINT").filter(|e| !e.trim().is_empty());

        if let Some(path) = get("MINGLE_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = get("MINGLE_OBJECTS_DIR") {
            config.objects_dir = PathBuf::from(dir);
        }

        config
    }

    pub fn push_enabled(&self) -> bool {
        self.fcm_server_key.is_some()
    }
}
