use quill_config::Config;
use std::time::Duration;

/// Timing knobs for the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Persisted-auth records older than this are discarded at bootstrap.
    pub persisted_auth_ttl: Duration,
    /// Idle time after which a failed refresh reads as inactivity.
    pub inactivity_threshold: Duration,
    /// Concurrent refresh callers wait at most this long for the in-flight attempt.
    pub refresh_throttle: Duration,
    /// HTTP request timeout for the reqwest transport.
    pub request_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionPolicy {
    fn from(config: &Config) -> Self {
        Self {
            persisted_auth_ttl: Duration::from_secs(config.persisted_auth_ttl_secs),
            inactivity_threshold: Duration::from_secs(config.inactivity_threshold_secs),
            refresh_throttle: Duration::from_millis(config.refresh_throttle_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}
