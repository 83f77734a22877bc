//! Anti-forgery tokens mirrored from server-set cookies.

use crate::protocol::{
    ACCESS_CSRF_COOKIE, REFRESH_CSRF_COOKIE, SESSION_COOKIES, SESSION_NONCE_COOKIE,
};
use crate::transport::CookieSource;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

/// The access-scoped token, refresh-scoped token and session nonce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AntiForgeryPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub state_nonce: Option<String>,
}

impl AntiForgeryPair {
    /// Parse a `name=value; name2=value2` cookie string. Unknown cookies are
    /// ignored, empty values read as absent. Never fails.
    pub fn parse(cookie_string: &str) -> Self {
        let mut pair = Self::default();
        for part in cookie_string.split(';') {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            let slot = match name.trim() {
                ACCESS_CSRF_COOKIE => &mut pair.access_token,
                REFRESH_CSRF_COOKIE => &mut pair.refresh_token,
                SESSION_NONCE_COOKIE => &mut pair.state_nonce,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        pair
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.state_nonce.is_none()
    }

    /// True when the cookies suggest a server-side session may exist.
    pub fn has_session_hints(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    /// Issue time encoded in the nonce (`<hex>:<unix-seconds>`), if any.
    pub fn nonce_issued_at(&self) -> Option<DateTime<Utc>> {
        let (_, seconds) = self.state_nonce.as_deref()?.rsplit_once(':')?;
        DateTime::from_timestamp(seconds.parse().ok()?, 0)
    }
}

/// Reads [`AntiForgeryPair`]s from a [`CookieSource`], caching the parse
/// until the underlying cookie string changes.
pub struct AntiForgeryReader {
    cookies: Arc<dyn CookieSource>,
    cache: Mutex<Option<(String, AntiForgeryPair)>>,
}

impl AntiForgeryReader {
    pub fn new(cookies: Arc<dyn CookieSource>) -> Self {
        Self {
            cookies,
            cache: Mutex::new(None),
        }
    }

    pub fn read_pair(&self) -> AntiForgeryPair {
        let raw = self.cookies.cookie_string();
        let mut cache = self.cache.lock();
        if let Some((cached_raw, pair)) = cache.as_ref() {
            if *cached_raw == raw {
                return pair.clone();
            }
        }
        let pair = AntiForgeryPair::parse(&raw);
        trace!(
            access = pair.access_token.is_some(),
            refresh = pair.refresh_token.is_some(),
            nonce = pair.state_nonce.is_some(),
            "Parsed anti-forgery cookies"
        );
        *cache = Some((raw, pair.clone()));
        pair
    }

    /// Drop the cached parse so the next read goes back to the cookies.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    /// Expire every session cookie locally and drop the cache.
    pub fn clear(&self) {
        self.cookies.expire(&SESSION_COOKIES);
        self.invalidate();
    }
}
