//! Request dispatch seam.
//!
//! The coordinator never talks to reqwest directly: it builds [`ApiRequest`]s
//! and hands them to a [`Transport`]. Cookies live on the transport side and
//! are visible to the coordinator only through [`CookieSource`].

use crate::cookie_jar::PersistentCookieJar;
use crate::protocol::{is_mutating, Endpoint};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A request relative to the API root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, e.g. `/posts/7`. May carry a query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// True for create/update/delete methods.
    pub fn is_mutating(&self) -> bool {
        is_mutating(&self.method)
    }

    /// True when the path (ignoring query and trailing slash) is `endpoint`.
    pub fn targets(&self, endpoint: Endpoint) -> bool {
        let path = self.path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');
        path == endpoint.path()
    }

    /// Set a header from a cookie-derived string. Values that are not legal
    /// header text are dropped with a warning.
    pub(crate) fn set_header(&mut self, name: &'static str, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => warn!(header = name, "Dropping header with invalid characters"),
        }
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn from_json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 401 and 403 both mean the session must be renewed.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }

    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The body parsed as JSON, or `None` when it is not JSON.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Short, secret-free description of the body for logs.
    pub fn summary(&self) -> String {
        match self.json_value() {
            Some(serde_json::Value::Object(map)) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                format!("json object keys=[{}]", keys.join(","))
            }
            Some(_) => format!("json value ({} bytes)", self.body.len()),
            None if self.body.is_empty() => "empty".to_string(),
            None => format!("non-json body ({} bytes)", self.body.len()),
        }
    }

    /// Server-provided message (`{"msg": ...}`), or the status line.
    pub fn error_message(&self) -> String {
        self.json_value()
            .as_ref()
            .and_then(|body| body.get("msg").or_else(|| body.get("message")))
            .and_then(|msg| msg.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// The request-dispatch primitive the coordinator wraps.
///
/// Implementations must include transport-level credentials (cookies) on
/// every request and absorb `Set-Cookie` headers from every response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse>;
}

/// Read access to the cookies the server has set.
pub trait CookieSource: Send + Sync {
    /// Script-visible cookies as `name=value; name2=value2`.
    fn cookie_string(&self) -> String;

    /// Drop the named cookies locally.
    fn expire(&self, names: &[&str]);
}

/// reqwest-backed transport with a persistent cookie jar.
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, jar: Arc<PersistentCookieJar>, timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Resolve a request path below the API root. The root's own path is
    /// kept, so `/login` under `http://host/api` becomes `http://host/api/login`.
    fn url_for(&self, path: &str) -> AuthResult<Url> {
        let root = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", root, path))?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let url = self.url_for(&request.path)?;
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                AuthError::Network(e.to_string())
            } else {
                AuthError::Http(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
