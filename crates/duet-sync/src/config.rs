//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use duet_shared::constants::{DEFAULT_PAGE_SIZE, PRESENCE_HEARTBEAT, TYPING_WINDOW};

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Messages per live page and per backfill page.
    /// Env: `DUET_PAGE_SIZE`
    /// Default: `25`
    pub page_size: usize,

    /// Typing debounce window.
    /// Env: `DUET_TYPING_WINDOW_SECS`
    /// Default: `3`
    pub typing_window: Duration,

    /// Presence heartbeat interval.
    /// Env: `DUET_HEARTBEAT_SECS`
    /// Default: `120`
    pub heartbeat: Duration,

    /// Remote moderation endpoint. Unset means the built-in phrase list.
    /// Env: `DUET_MODERATION_URL`
    pub moderation_url: Option<String>,

    /// Whether edits pass through the moderation gate like new messages.
    /// Env: `DUET_MODERATE_EDITS` (true/false)
    /// Default: `true`
    pub moderate_edits: bool,

    /// SQLite database file. Unset means the platform data directory.
    /// Env: `DUET_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Directory for uploaded avatars.
    /// Env: `DUET_BLOB_PATH`
    /// Default: `./blobs`
    pub blob_path: PathBuf,

    /// Public base URL for uploaded blobs. Unset means a `file://` URL.
    /// Env: `DUET_BLOB_BASE_URL`
    pub blob_base_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            typing_window: TYPING_WINDOW,
            heartbeat: PRESENCE_HEARTBEAT,
            moderation_url: None,
            moderate_edits: true,
            db_path: None,
            blob_path: PathBuf::from("./blobs"),
            blob_base_url: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an explicit variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = var("DUET_PAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid DUET_PAGE_SIZE, using default"),
            }
        }

        if let Some(val) = var("DUET_TYPING_WINDOW_SECS") {
            match parse_secs(&val) {
                Some(window) => config.typing_window = window,
                None => tracing::warn!(value = %val, "Invalid DUET_TYPING_WINDOW_SECS, using default"),
            }
        }

        if let Some(val) = var("DUET_HEARTBEAT_SECS") {
            match parse_secs(&val) {
                Some(interval) => config.heartbeat = interval,
                None => tracing::warn!(value = %val, "Invalid DUET_HEARTBEAT_SECS, using default"),
            }
        }

        if let Some(url) = var("DUET_MODERATION_URL") {
            if !url.is_empty() {
                config.moderation_url = Some(url);
            }
        }

        if let Some(val) = var("DUET_MODERATE_EDITS") {
            config.moderate_edits = val != "false" && val != "0";
        }

        if let Some(path) = var("DUET_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = var("DUET_BLOB_PATH") {
            config.blob_path = PathBuf::from(path);
        }

        if let Some(url) = var("DUET_BLOB_BASE_URL") {
            if !url.is_empty() {
                config.blob_base_url = Some(url);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_secs(val: &str) -> Option<Duration> {
    match val.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.typing_window, Duration::from_secs(3));
        assert_eq!(config.heartbeat, Duration::from_secs(120));
        assert!(config.moderate_edits);
        assert!(config.moderation_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_vars(vars(&[
            ("DUET_PAGE_SIZE", "10"),
            ("DUET_TYPING_WINDOW_SECS", "5"),
            ("DUET_MODERATE_EDITS", "false"),
            ("DUET_MODERATION_URL", "http://localhost:9000/moderate"),
            ("DUET_DB_PATH", "/tmp/duet.db"),
        ]));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.typing_window, Duration::from_secs(5));
        assert!(!config.moderate_edits);
        assert_eq!(config.moderation_url.as_deref(), Some("http://localhost:9000/moderate"));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/duet.db")));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = SyncConfig::from_vars(vars(&[
            ("DUET_PAGE_SIZE", "0"),
            ("DUET_HEARTBEAT_SECS", "soon"),
        ]));
        assert_eq!(config.page_size, 25);
        assert_eq!(config.heartbeat, Duration::from_secs(120));
    }
}
