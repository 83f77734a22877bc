//! # Observability
//!
//! Centralized logging layer for the Quill client.
//!
//! Binaries call `observability::init_with_config()` once at startup and use
//! the standard `tracing` macros everywhere else. Library crates never touch
//! the subscriber.
//!
//! ## Dev Mode
//!
//! With the `dev` feature (on by default) every process appends structured
//! JSONL to a single file, `~/.quill/logs/dev.jsonl`:
//!
//! - `tail -f ~/.quill/logs/dev.jsonl | jq` for pretty JSON
//! - `lnav ~/.quill/logs/dev.jsonl` for interactive exploration
//!
//! Values recorded under sensitive field names (tokens, passwords, cookies,
//! fingerprints) are redacted before they reach the file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "cli".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("ready");
//! }
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;
mod redact;

use std::path::PathBuf;

pub use redact::{is_sensitive_key, redact_value};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "cli", "session").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.quill/logs/dev.jsonl` in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this more than once per process is harmless: later calls leave the
/// first subscriber in place.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config);
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .finish()
            .try_init();
    }
}
