//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so a client starts with zero configuration.

use std::time::Duration;

use mingle_shared::constants::{HEARTBEAT_INTERVAL_SECS, MAX_FILE_SIZE, PRESENCE_WINDOW_SECS};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between presence heartbeats.
    /// Env: `MINGLE_HEARTBEAT_SECS`
    /// Default: 240
    pub heartbeat_interval: Duration,

    /// A user is online while their last heartbeat is younger than this.
    /// Env: `MINGLE_PRESENCE_WINDOW_SECS`
    /// Default: 300
    pub presence_window: chrono::Duration,

    /// Public base URL, used for invitation links.
    /// Env: `MINGLE_SITE_URL`
    /// Default: `http://localhost:5173`
    pub site_url: String,

    /// First delay before re-opening a dropped subscription.
    /// Env: `MINGLE_RECONNECT_BASE_MS`
    /// Default: 500
    pub reconnect_base: Duration,

    /// Upper bound of the reconnect delay.
    /// Env: `MINGLE_RECONNECT_MAX_MS`
    /// Default: 30000
    pub reconnect_max: Duration,

    /// Largest accepted attachment, in bytes.
    /// Env: `MINGLE_MAX_FILE_SIZE`
    /// Default: 10 MiB
    pub max_file_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            presence_window: chrono::Duration::seconds(PRESENCE_WINDOW_SECS),
            site_url: "http://localhost:5173".to_string(),
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_millis(30_000),
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, "MINGLE_HEARTBEAT_SECS") {
            if secs > 0 {
                config.heartbeat_interval = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = parse_var::<i64>(&lookup, "MINGLE_PRESENCE_WINDOW_SECS") {
            config.presence_window = chrono::Duration::seconds(secs);
        }

        if let Some(url) = lookup("MINGLE_SITE_URL") {
            if !url.is_empty() {
                config.site_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "MINGLE_RECONNECT_BASE_MS") {
            config.reconnect_base = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "MINGLE_RECONNECT_MAX_MS") {
            config.reconnect_max = Duration::from_millis(ms);
        }

        if let Some(bytes) = parse_var::<usize>(&lookup, "MINGLE_MAX_FILE_SIZE") {
            config.max_file_size = bytes;
        }

        // RUST_LOG is read by the EnvFilter in `init_tracing`.

        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
