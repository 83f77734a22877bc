//! Session error types.

use thiserror::Error;

/// Session error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected by the server
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Account creation rejected by the server
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Refresh failed after the user had been idle past the inactivity threshold.
    /// Local state has already been cleared.
    #[error("Session ended due to inactivity")]
    InactivityLogout,

    /// Refresh failed while the user was active. Local state has already been cleared.
    #[error("Session expired")]
    SessionExpired,

    /// Operation needs a confirmed session and there is none
    #[error("Not logged in")]
    NotLoggedIn,

    /// Non-authorization HTTP failure from a session flow
    #[error("Request rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Success status with a body that cannot serve the caller
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Caller-supplied value rejected before any request was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] quill_storage::StorageError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure outside reqwest
    #[error("Network error: {0}")]
    Network(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<quill_config::CoreError> for AuthError {
    fn from(error: quill_config::CoreError) -> Self {
        AuthError::Config(error.to_string())
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::Rejected { status, .. } => *status >= 500,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }

    /// Returns true if the session was forcibly ended and the user must log in again.
    pub fn is_session_end(&self) -> bool {
        matches!(self, AuthError::InactivityLogout | AuthError::SessionExpired)
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
