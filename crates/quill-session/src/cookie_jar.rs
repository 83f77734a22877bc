//! Cookie jar shared by the reqwest client and the anti-forgery reader,
//! persisted through [`ClientStore`] so a session survives restarts.

use crate::transport::CookieSource;
use chrono::Utc;
use cookie::Cookie;
use parking_lot::RwLock;
use quill_storage::ClientStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    host: String,
    path: String,
    /// Epoch seconds; `None` for session cookies.
    expires_at: Option<i64>,
    http_only: bool,
}

impl StoredCookie {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    fn matches(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host.as_str()) && path_matches(&self.path, url.path())
    }
}

/// RFC 6265 path-match.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// RFC 6265 default-path: the request path up to its last `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

/// Cookie store keyed by cookie name.
///
/// The API is a single origin, so names are unique in practice; a later
/// `Set-Cookie` for the same name replaces the earlier one.
pub struct PersistentCookieJar {
    cookies: RwLock<BTreeMap<String, StoredCookie>>,
    store: Option<ClientStore>,
}

impl PersistentCookieJar {
    /// Jar that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            cookies: RwLock::new(BTreeMap::new()),
            store: None,
        }
    }

    /// Jar backed by `store`. An unreadable snapshot starts empty.
    pub fn load(store: ClientStore) -> Self {
        let cookies = match store.cookie_jar_snapshot() {
            Ok(Some(snapshot)) => match serde_json::from_str(&snapshot) {
                Ok(cookies) => cookies,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable cookie jar snapshot");
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read cookie jar snapshot");
                BTreeMap::new()
            }
        };
        debug!(count = cookies.len(), "Loaded cookie jar");
        Self {
            cookies: RwLock::new(cookies),
            store: Some(store),
        }
    }

    pub fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        self.cookies.read().values().filter(|c| c.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absorb one `Set-Cookie` header value received from `url`.
    /// Returns true when the jar changed.
    fn absorb(&self, header: &str, url: &Url, now: i64) -> bool {
        let parsed = match Cookie::parse(header) {
            Ok(cookie) => cookie,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed Set-Cookie header");
                return false;
            }
        };
        let Some(host) = url.host_str() else {
            return false;
        };

        // Max-Age takes precedence over Expires.
        let expires_at = match parsed.max_age() {
            Some(max_age) => Some(now + max_age.whole_seconds()),
            None => parsed.expires_datetime().map(|at| at.unix_timestamp()),
        };

        let name = parsed.name().to_string();
        let mut cookies = self.cookies.write();
        if expires_at.is_some_and(|at| at <= now) {
            return cookies.remove(&name).is_some();
        }

        let path = parsed
            .path()
            .filter(|path| path.starts_with('/'))
            .map(str::to_string)
            .unwrap_or_else(|| default_path(url));
        let cookie = StoredCookie {
            value: parsed.value().to_string(),
            host: host.to_string(),
            path,
            expires_at,
            http_only: parsed.http_only().unwrap_or(false),
        };
        cookies.insert(name, cookie.clone()) != Some(cookie)
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let now = Utc::now().timestamp();
        // Session cookies are kept too: a CLI process is shorter than a browser session.
        let encoded = {
            let cookies = self.cookies.read();
            let live: BTreeMap<&String, &StoredCookie> = cookies
                .iter()
                .filter(|(_, cookie)| cookie.is_live(now))
                .collect();
            serde_json::to_string(&live)
        };
        let snapshot = match encoded {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to encode cookie jar");
                return;
            }
        };
        if let Err(e) = store.set_cookie_jar_snapshot(&snapshot) {
            warn!(error = %e, "Failed to persist cookie jar");
        }
    }
}

impl reqwest::cookie::CookieStore for PersistentCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = Utc::now().timestamp();
        let mut changed = false;
        for header in cookie_headers {
            if let Ok(header) = header.to_str() {
                changed |= self.absorb(header, url, now);
            }
        }
        if changed {
            self.persist();
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let now = Utc::now().timestamp();
        let header = self
            .cookies
            .read()
            .iter()
            .filter(|(_, cookie)| cookie.is_live(now) && cookie.matches(url))
            .map(|(name, cookie)| format!("{}={}", name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

impl CookieSource for PersistentCookieJar {
    /// HttpOnly cookies are excluded, the way a page script would see them.
    fn cookie_string(&self) -> String {
        let now = Utc::now().timestamp();
        self.cookies
            .read()
            .iter()
            .filter(|(_, cookie)| cookie.is_live(now) && !cookie.http_only)
            .map(|(name, cookie)| format!("{}={}", name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn expire(&self, names: &[&str]) {
        let removed = {
            let mut cookies = self.cookies.write();
            names
                .iter()
                .filter(|name| cookies.remove(**name).is_some())
                .count()
        };
        if removed > 0 {
            debug!(removed, "Expired cookies locally");
            self.persist();
        }
    }
}
