//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries get the central
//! JSONL stream at `~/.quill/logs/dev.jsonl` with one call.

use crate::{CoreError, CoreResult, Paths};

/// Initialize the logging system.
///
/// - Structured JSONL output to `<base>/logs/dev.jsonl`
/// - Log level from `RUST_LOG` or the provided default
/// - Optional compact stderr output
///
/// ```ignore
/// init_logging("cli", "info", &paths, false);
/// tracing::info!("started");
/// ```
pub fn init_logging(service_name: &str, level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}

/// Parse a log level name, case-insensitively.
pub fn parse_level(level: &str) -> CoreResult<tracing::Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" | "warning" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        other => Err(CoreError::Config(format!(
            "unknown log level '{}' (expected trace, debug, info, warn or error)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_accepts_names_in_any_case() {
        assert_eq!(parse_level("trace").unwrap(), tracing::Level::TRACE);
        assert_eq!(parse_level("Debug").unwrap(), tracing::Level::DEBUG);
        assert_eq!(parse_level(" info ").unwrap(), tracing::Level::INFO);
        assert_eq!(parse_level("WARNING").unwrap(), tracing::Level::WARN);
        assert_eq!(parse_level("error").unwrap(), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_rejects_unknown_names() {
        assert!(matches!(parse_level("verbose"), Err(CoreError::Config(_))));
        assert!(parse_level("").is_err());
    }
}
