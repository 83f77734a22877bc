//! In-process fake of the Quill API.
//!
//! `FakeServer` is both the [`Transport`] and the [`CookieSource`] of the
//! client under test: it plays the server and the cookie jar at once, so
//! every `Set-Cookie` it would send lands directly in its own cookie map.
//! Requests are recorded for assertions.

use crate::context::now_millis;
use crate::protocol::{
    ACCESS_CSRF_COOKIE, CSRF_TOKEN_HEADER, FINGERPRINT_HEADER, REFRESH_CSRF_COOKIE,
    SESSION_NONCE_COOKIE, SESSION_NONCE_HEADER,
};
use crate::{
    ApiRequest, ApiResponse, AuthError, AuthResult, CookieSource, Endpoint, SessionClient,
    SessionPolicy, Transport,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use quill_storage::{
    ClientStore, DurableStorage, MemoryStorage, PersistedAuthRecord, StorageError, StorageResult,
};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_USER_ID: u64 = 42;
pub const TEST_USERNAME: &str = "ada";
pub const TEST_PASSWORD: &str = "correct-horse";

/// How the fake answers `/refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Rotate tokens and return the user and lifetimes.
    Accept,
    /// Answer 401.
    Reject,
    /// Rotate tokens but answer with a non-JSON body.
    Malformed,
    /// Fail at the transport level.
    NetworkError,
}

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub csrf_token: Option<String>,
    pub nonce: Option<String>,
    pub fingerprint: Option<String>,
}

impl RecordedRequest {
    fn from_request(request: &ApiRequest) -> Self {
        let header = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            csrf_token: header(CSRF_TOKEN_HEADER),
            nonce: header(SESSION_NONCE_HEADER),
            fingerprint: header(FINGERPRINT_HEADER),
        }
    }

    pub fn targets(&self, endpoint: Endpoint) -> bool {
        self.path == endpoint.path()
    }
}

struct ServerState {
    cookies: BTreeMap<String, String>,
    generation: u32,
    session_valid: bool,
    refresh_mode: RefreshMode,
    refresh_delay: Duration,
    me_malformed: bool,
    logout_fails: bool,
    protected_always_unauthorized: bool,
    network_down: bool,
    requests: Vec<RecordedRequest>,
}

pub struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    /// A server with no session and no cookies.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                cookies: BTreeMap::new(),
                generation: 0,
                session_valid: false,
                refresh_mode: RefreshMode::Accept,
                refresh_delay: Duration::ZERO,
                me_malformed: false,
                logout_fails: false,
                protected_always_unauthorized: false,
                network_down: false,
                requests: Vec::new(),
            }),
        })
    }

    // ==========================================
    // Scenario setup
    // ==========================================

    /// Issue a fresh session, as a prior login would have.
    pub fn issue_session(&self) {
        let mut state = self.state.lock();
        Self::rotate(&mut state);
        state.session_valid = true;
    }

    /// The access token lapses; cookies stay in place.
    pub fn expire_access(&self) {
        self.state.lock().session_valid = false;
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        self.state.lock().refresh_mode = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().refresh_delay = delay;
    }

    pub fn set_me_malformed(&self, malformed: bool) {
        self.state.lock().me_malformed = malformed;
    }

    pub fn set_logout_fails(&self, fails: bool) {
        self.state.lock().logout_fails = fails;
    }

    /// Protected endpoints answer 401 even with a freshly refreshed session.
    pub fn set_protected_always_unauthorized(&self, on: bool) {
        self.state.lock().protected_always_unauthorized = on;
    }

    pub fn set_network_down(&self, down: bool) {
        self.state.lock().network_down = down;
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.state
            .lock()
            .cookies
            .insert(name.to_string(), value.to_string());
    }

    // ==========================================
    // Assertions
    // ==========================================

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.targets(endpoint))
            .count()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.state.lock().cookies.get(name).cloned()
    }

    pub fn generation(&self) -> u32 {
        self.state.lock().generation
    }

    // ==========================================
    // Server behaviour
    // ==========================================

    fn rotate(state: &mut ServerState) {
        state.generation += 1;
        let g = state.generation;
        state
            .cookies
            .insert(ACCESS_CSRF_COOKIE.to_string(), format!("access-{}", g));
        state
            .cookies
            .insert(REFRESH_CSRF_COOKIE.to_string(), format!("refresh-{}", g));
        state.cookies.insert(
            SESSION_NONCE_COOKIE.to_string(),
            format!("{:08x}:{}", g, 1_700_000_000 + g as u64),
        );
    }

    fn session_body() -> Value {
        json!({
            "user": { "id": TEST_USER_ID, "username": TEST_USERNAME },
            "token_lifetime": 1800,
            "refresh_token_lifetime": 1_296_000
        })
    }

    fn unauthorized(message: &str) -> ApiResponse {
        ApiResponse::from_json(StatusCode::UNAUTHORIZED, &json!({ "msg": message }))
    }

    /// A mutating request must echo the cookie named `cookie`.
    fn csrf_ok(state: &ServerState, request: &RecordedRequest, cookie: &str) -> bool {
        match (&request.csrf_token, state.cookies.get(cookie)) {
            (Some(sent), Some(expected)) => sent == expected,
            _ => false,
        }
    }

    fn login(state: &mut ServerState, body: Option<&Value>) -> ApiResponse {
        let field = |name: &str| {
            body.and_then(|b| b.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        if field("username") != TEST_USERNAME || field("password") != TEST_PASSWORD {
            return Self::unauthorized("Invalid credentials");
        }
        Self::rotate(state);
        state.session_valid = true;
        ApiResponse::from_json(StatusCode::OK, &Self::session_body())
    }

    fn refresh(state: &mut ServerState, request: &RecordedRequest) -> AuthResult<ApiResponse> {
        if !Self::csrf_ok(state, request, REFRESH_CSRF_COOKIE) {
            return Ok(Self::unauthorized("Missing or invalid CSRF token"));
        }
        match state.refresh_mode {
            RefreshMode::NetworkError => Err(AuthError::Network("connection reset".to_string())),
            RefreshMode::Reject => Ok(Self::unauthorized("Token has expired")),
            RefreshMode::Malformed => {
                Self::rotate(state);
                state.session_valid = true;
                Ok(ApiResponse::new(StatusCode::OK, "<html>ok</html>"))
            }
            RefreshMode::Accept => {
                Self::rotate(state);
                state.session_valid = true;
                Ok(ApiResponse::from_json(StatusCode::OK, &Self::session_body()))
            }
        }
    }

    fn protected(
        state: &mut ServerState,
        request: &RecordedRequest,
        body: Option<&Value>,
    ) -> ApiResponse {
        if !state.session_valid || state.protected_always_unauthorized {
            return Self::unauthorized("Token has expired");
        }
        if crate::protocol::is_mutating(&request.method)
            && !Self::csrf_ok(state, request, ACCESS_CSRF_COOKIE)
        {
            return Self::unauthorized("CSRF double submit tokens do not match");
        }

        match request.path.as_str() {
            "/me" if state.me_malformed => ApiResponse::new(StatusCode::OK, "<html>"),
            "/me" => ApiResponse::from_json(
                StatusCode::OK,
                &json!({
                    "id": TEST_USER_ID,
                    "username": TEST_USERNAME,
                    "email": "ada@example.com"
                }),
            ),
            "/settings/token-settings" => {
                let lifetime = |name: &str| body.and_then(|b| b.get(name)).and_then(Value::as_u64);
                match (lifetime("token_lifetime"), lifetime("refresh_token_lifetime")) {
                    (Some(access), Some(refresh)) => {
                        Self::rotate(state);
                        ApiResponse::from_json(
                            StatusCode::OK,
                            &json!({
                                "msg": "Settings updated",
                                "token_lifetime": access,
                                "refresh_token_lifetime": refresh
                            }),
                        )
                    }
                    _ => ApiResponse::from_json(
                        StatusCode::BAD_REQUEST,
                        &json!({ "msg": "Invalid token lifetime" }),
                    ),
                }
            }
            "/token-info" => ApiResponse::from_json(
                StatusCode::OK,
                &json!({ "identity": TEST_USER_ID.to_string(), "generation": state.generation }),
            ),
            path => ApiResponse::from_json(StatusCode::OK, &json!({ "ok": true, "path": path })),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let recorded = RecordedRequest::from_request(request);
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(recorded.clone());
            if state.network_down {
                return Err(AuthError::Network("connection refused".to_string()));
            }
            if recorded.targets(Endpoint::Refresh) {
                state.refresh_delay
            } else {
                Duration::ZERO
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let path = recorded.path.as_str();
        match path {
            "/login" => Ok(Self::login(&mut state, request.body.as_ref())),
            "/register" => {
                let username = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("username"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if username == TEST_USERNAME {
                    Ok(ApiResponse::from_json(
                        StatusCode::BAD_REQUEST,
                        &json!({ "msg": "Username already exists" }),
                    ))
                } else {
                    Ok(ApiResponse::from_json(
                        StatusCode::CREATED,
                        &json!({ "msg": "User registered" }),
                    ))
                }
            }
            "/refresh" => Self::refresh(&mut state, &recorded),
            "/logout" => {
                if state.logout_fails {
                    return Err(AuthError::Network("connection reset".to_string()));
                }
                state.cookies.clear();
                state.session_valid = false;
                Ok(ApiResponse::from_json(StatusCode::OK, &json!({ "msg": "Logged out" })))
            }
            _ => Ok(Self::protected(&mut state, &recorded, request.body.as_ref())),
        }
    }
}

impl CookieSource for FakeServer {
    fn cookie_string(&self) -> String {
        self.state
            .lock()
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn expire(&self, names: &[&str]) {
        let mut state = self.state.lock();
        for name in names {
            state.cookies.remove(*name);
        }
    }
}

// ==========================================
// Fixtures
// ==========================================

pub fn memory_store() -> ClientStore {
    ClientStore::new(Arc::new(MemoryStorage::new()))
}

/// Storage that serves reads from a seeded map and rejects every write.
pub struct ReadOnlyStorage {
    inner: MemoryStorage,
}

impl DurableStorage for ReadOnlyStorage {
    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Backend("read-only".to_string()))
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Backend("read-only".to_string()))
    }
}

/// A store whose backend holds `entries` and refuses to change them.
pub fn read_only_store(entries: &[(&str, &str)]) -> ClientStore {
    let inner = MemoryStorage::new();
    for (key, value) in entries {
        inner.set(key, value).unwrap();
    }
    ClientStore::new(Arc::new(ReadOnlyStorage { inner }))
}

pub fn test_policy() -> SessionPolicy {
    SessionPolicy {
        persisted_auth_ttl: Duration::from_secs(24 * 60 * 60),
        inactivity_threshold: Duration::from_secs(60 * 60),
        refresh_throttle: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
    }
}

pub fn client_with(server: &Arc<FakeServer>, store: ClientStore) -> SessionClient {
    client_with_policy(server, store, test_policy())
}

pub fn client_with_policy(
    server: &Arc<FakeServer>,
    store: ClientStore,
    policy: SessionPolicy,
) -> SessionClient {
    SessionClient::new(server.clone(), server.clone(), store, policy)
}

/// A server holding a valid session whose cookies the client already has.
pub fn logged_in_server() -> Arc<FakeServer> {
    let server = FakeServer::new();
    server.issue_session();
    server
}

/// Persist an auth record saved `age` ago.
pub fn persist_record(store: &ClientStore, user_id: &str, age: Duration) {
    let saved_at = now_millis() - age.as_millis() as i64;
    store
        .save_auth_record(&PersistedAuthRecord::new(user_id, saved_at))
        .unwrap();
}

/// Make the client look idle for `idle`.
pub fn go_idle(client: &SessionClient, idle: Duration) {
    client
        .activity()
        .set_last_activity(now_millis() - idle.as_millis() as i64);
}
