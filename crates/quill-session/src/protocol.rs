//! Wire names shared with the API server.

use reqwest::Method;

/// Anti-forgery token for ordinary protected requests.
pub const ACCESS_CSRF_COOKIE: &str = "csrf_access_token";
/// Anti-forgery token accepted only by the refresh endpoint.
pub const REFRESH_CSRF_COOKIE: &str = "csrf_refresh_token";
/// Session nonce, `<hex>:<unix-seconds>`, rotated by the server.
pub const SESSION_NONCE_COOKIE: &str = "csrf_state";
/// HttpOnly JWT cookies. Never read, only expired locally on logout.
pub const ACCESS_JWT_COOKIE: &str = "access_token_cookie";
pub const REFRESH_JWT_COOKIE: &str = "refresh_token_cookie";

/// Every cookie that belongs to a login session.
pub const SESSION_COOKIES: [&str; 5] = [
    ACCESS_CSRF_COOKIE,
    REFRESH_CSRF_COOKIE,
    SESSION_NONCE_COOKIE,
    ACCESS_JWT_COOKIE,
    REFRESH_JWT_COOKIE,
];

// Header names are lowercase so they can back `HeaderName::from_static`.
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
pub const SESSION_NONCE_HEADER: &str = "x-csrf-state";
pub const FINGERPRINT_HEADER: &str = "x-device-fingerprint";

/// Session endpoints, relative to the API root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Register,
    Refresh,
    Logout,
    Me,
    TokenSettings,
    TokenInfo,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Login => "/login",
            Endpoint::Register => "/register",
            Endpoint::Refresh => "/refresh",
            Endpoint::Logout => "/logout",
            Endpoint::Me => "/me",
            Endpoint::TokenSettings => "/settings/token-settings",
            Endpoint::TokenInfo => "/token-info",
        }
    }
}

/// Methods with create/update/delete semantics; these carry anti-forgery headers.
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutating_methods() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::PATCH));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
        assert!(!is_mutating(&Method::OPTIONS));
    }

    #[test]
    fn test_header_names_are_valid_static_names() {
        for name in [CSRF_TOKEN_HEADER, SESSION_NONCE_HEADER, FINGERPRINT_HEADER] {
            let header = reqwest::header::HeaderName::from_static(name);
            assert_eq!(header.as_str(), name);
        }
    }
}
