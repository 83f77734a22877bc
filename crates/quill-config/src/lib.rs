//! Configuration, filesystem layout and logging bootstrap for the Quill client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_INACTIVITY_THRESHOLD_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_PERSISTED_AUTH_TTL_SECS, DEFAULT_REFRESH_THROTTLE_MS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
