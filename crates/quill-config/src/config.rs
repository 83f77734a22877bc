//! Configuration management for the client.

use crate::{parse_level, CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default API root. Every endpoint path is resolved against it.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Persisted-auth records older than this are discarded at bootstrap (24h).
pub const DEFAULT_PERSISTED_AUTH_TTL_SECS: u64 = 24 * 60 * 60;

/// Idle time after which a failed refresh is reported as inactivity (1h).
pub const DEFAULT_INACTIVITY_THRESHOLD_SECS: u64 = 60 * 60;

/// Window during which concurrent refresh callers share one attempt.
pub const DEFAULT_REFRESH_THROTTLE_MS: u64 = 5_000;

/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// API root URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Maximum age of the persisted-auth record, in seconds.
    #[serde(default = "default_persisted_auth_ttl_secs")]
    pub persisted_auth_ttl_secs: u64,
    /// Idle threshold separating "inactivity" from "session expired", in seconds.
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    /// Refresh single-flight window, in milliseconds.
    #[serde(default = "default_refresh_throttle_ms")]
    pub refresh_throttle_ms: u64,
    /// HTTP request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_persisted_auth_ttl_secs() -> u64 {
    DEFAULT_PERSISTED_AUTH_TTL_SECS
}

fn default_inactivity_threshold_secs() -> u64 {
    DEFAULT_INACTIVITY_THRESHOLD_SECS
}

fn default_refresh_throttle_ms() -> u64 {
    DEFAULT_REFRESH_THROTTLE_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            persisted_auth_ttl_secs: DEFAULT_PERSISTED_AUTH_TTL_SECS,
            inactivity_threshold_secs: DEFAULT_INACTIVITY_THRESHOLD_SECS,
            refresh_throttle_ms: DEFAULT_REFRESH_THROTTLE_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from `QUILL_*` environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(log_level) = lookup("QUILL_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(url) = lookup("QUILL_API_URL") {
            self.api_base_url = url;
        }
        override_u64(
            &mut self.persisted_auth_ttl_secs,
            "QUILL_PERSISTED_AUTH_TTL_SECS",
            &lookup,
        );
        override_u64(
            &mut self.inactivity_threshold_secs,
            "QUILL_INACTIVITY_THRESHOLD_SECS",
            &lookup,
        );
    }

    /// Reject values the session layer cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        parse_level(&self.log_level)?;
        if self.refresh_throttle_ms == 0 {
            return Err(CoreError::Config(
                "refresh_throttle_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the API root as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.api_base_url)?;
        if url.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "api_base_url is not a base URL: {}",
                self.api_base_url
            )));
        }
        Ok(url)
    }
}

fn override_u64(slot: &mut u64, name: &str, lookup: &impl Fn(&str) -> Option<String>) {
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<u64>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(variable = name, value = %raw, "Ignoring non-numeric override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.persisted_auth_ttl_secs, 86_400);
        assert_eq!(config.inactivity_threshold_secs, 3_600);
        assert_eq!(config.refresh_throttle_ms, 5_000);
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "persisted_auth_ttl_secs": 2592000
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.persisted_auth_ttl_secs, 2_592_000);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.inactivity_threshold_secs, DEFAULT_INACTIVITY_THRESHOLD_SECS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            api_base_url: "https://blog.example.com/api".to_string(),
            inactivity_threshold_secs: 900,
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        assert!(Config::load_from_file(&paths.config_file()).is_err());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.refresh_throttle_ms, DEFAULT_REFRESH_THROTTLE_MS);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = [
            ("QUILL_LOG_LEVEL", "trace"),
            ("QUILL_API_URL", "https://staging.example.com/api"),
            ("QUILL_PERSISTED_AUTH_TTL_SECS", "3600"),
            ("QUILL_INACTIVITY_THRESHOLD_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.api_base_url, "https://staging.example.com/api");
        assert_eq!(config.persisted_auth_ttl_secs, 3_600);
        assert_eq!(
            config.inactivity_threshold_secs,
            DEFAULT_INACTIVITY_THRESHOLD_SECS
        );
    }

    #[test]
    fn test_config_api_url_parse() {
        let url = Config::default().api_base_url().unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.path(), "/api");
    }

    #[test]
    fn test_config_invalid_url() {
        let config = Config {
            api_base_url: "not a valid url".to_string(),
            ..Config::default()
        };
        assert!(config.api_base_url().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_throttle() {
        let config = Config {
            refresh_throttle_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let config = Config {
            log_level: "chatty".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
        let config = Config {
            log_level: "DEBUG".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
