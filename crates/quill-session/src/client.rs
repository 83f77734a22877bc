//! Public entry point: one [`SessionClient`] per logical client.

use crate::activity::ActivityMonitor;
use crate::anti_forgery::{AntiForgeryPair, AntiForgeryReader};
use crate::bootstrap::Bootstrap;
use crate::context::{now_millis, Confirmation, SessionContext};
use crate::cookie_jar::PersistentCookieJar;
use crate::credentials::{CredentialState, CredentialStore};
use crate::dispatch::AuthDispatcher;
use crate::fingerprint::FingerprintGenerator;
use crate::payload::{lifetimes_from, user_id_from, UserId, UserProfile};
use crate::phase::{PhaseTracker, SessionMachineInput, SessionPhase};
use crate::policy::SessionPolicy;
use crate::protocol::Endpoint;
use crate::refresh::RefreshCoordinator;
use crate::transport::{ApiRequest, ApiResponse, CookieSource, ReqwestTransport, Transport};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use quill_config::{Config, Paths};
use quill_storage::{ClientStore, FileStorage, SessionLifetimes};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Access token lifetime bounds accepted by the server, in seconds (5 min to 24 h).
pub const TOKEN_LIFETIME_RANGE: RangeInclusive<u64> = 300..=86_400;
/// Refresh token lifetime bounds accepted by the server, in seconds (1 to 30 days).
pub const REFRESH_TOKEN_LIFETIME_RANGE: RangeInclusive<u64> = 86_400..=2_592_000;

/// Requested session lifetimes for the token-settings endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    pub token_lifetime: u64,
    pub refresh_token_lifetime: u64,
}

impl TokenSettings {
    pub fn validate(&self) -> AuthResult<()> {
        if !TOKEN_LIFETIME_RANGE.contains(&self.token_lifetime) {
            return Err(AuthError::InvalidInput(format!(
                "token lifetime must be between {} and {} seconds",
                TOKEN_LIFETIME_RANGE.start(),
                TOKEN_LIFETIME_RANGE.end()
            )));
        }
        if !REFRESH_TOKEN_LIFETIME_RANGE.contains(&self.refresh_token_lifetime) {
            return Err(AuthError::InvalidInput(format!(
                "refresh token lifetime must be between {} and {} seconds",
                REFRESH_TOKEN_LIFETIME_RANGE.start(),
                REFRESH_TOKEN_LIFETIME_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of the session for status output. Never carries
/// token values, only whether they are present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user_id: Option<UserId>,
    pub last_activity: Option<DateTime<Utc>>,
    pub idle_secs: u64,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub nonce_issued_at: Option<DateTime<Utc>>,
    pub lifetimes: SessionLifetimes,
    pub refresh_in_flight: bool,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

fn require_non_empty(field: &str, value: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

/// Client-side session coordinator.
pub struct SessionClient {
    ctx: Arc<SessionContext>,
    refresh: Arc<RefreshCoordinator>,
    dispatcher: AuthDispatcher,
    bootstrap: Bootstrap,
}

impl SessionClient {
    /// Assemble a client from its collaborators.
    ///
    /// `cookies` must observe the same cookie jar `transport` uses.
    pub fn new(
        transport: Arc<dyn Transport>,
        cookies: Arc<dyn CookieSource>,
        store: ClientStore,
        policy: SessionPolicy,
    ) -> Self {
        let ctx = Arc::new(SessionContext {
            policy,
            transport,
            credentials: CredentialStore::new(),
            anti_forgery: AntiForgeryReader::new(cookies),
            fingerprint: FingerprintGenerator::new(store.clone()),
            store,
            activity: ActivityMonitor::new(),
            phase: PhaseTracker::new(),
        });
        let refresh = Arc::new(RefreshCoordinator::new(Arc::clone(&ctx)));
        Self {
            dispatcher: AuthDispatcher::new(Arc::clone(&ctx), Arc::clone(&refresh)),
            bootstrap: Bootstrap::new(Arc::clone(&ctx), Arc::clone(&refresh)),
            refresh,
            ctx,
        }
    }

    /// Build a client that talks to the configured API and persists its
    /// state under `paths`.
    pub fn connect(config: &Config, paths: &Paths) -> AuthResult<Self> {
        paths.ensure_dirs()?;
        let storage = FileStorage::open(paths.client_state_file())?;
        let store = ClientStore::new(Arc::new(storage));
        let policy = SessionPolicy::from(config);

        let jar = Arc::new(PersistentCookieJar::load(store.clone()));
        let transport = ReqwestTransport::new(
            config.api_base_url()?,
            Arc::clone(&jar),
            policy.request_timeout,
        )?;
        debug!(api = %config.api_base_url, "Session client connected");

        Ok(Self::new(Arc::new(transport), jar, store, policy))
    }

    // ==========================================
    // Coordinator operations
    // ==========================================

    /// Reconcile local hints with the server. Runs once per client.
    pub async fn init_auth(&self) {
        self.bootstrap.init_auth().await;
    }

    pub fn is_initialized(&self) -> bool {
        self.bootstrap.is_initialized()
    }

    /// Send a request with session headers, refreshing once on 401/403.
    pub async fn auth_fetch(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        self.dispatcher.auth_fetch(request).await
    }

    /// Renew the session. Concurrent callers share one request.
    pub async fn refresh(&self) -> bool {
        self.refresh.refresh().await
    }

    // ==========================================
    // Account flows
    // ==========================================

    /// Log in and return the confirmed user id.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<UserId> {
        require_non_empty("username", username)?;
        require_non_empty("password", password)?;

        let ctx = &self.ctx;
        ctx.phase.apply(SessionMachineInput::LoginAttempt);
        match self.try_login(username.trim(), password).await {
            Ok(user_id) => {
                ctx.adopt_identity(user_id.clone());
                ctx.activity.touch();
                ctx.phase.apply(SessionMachineInput::LoginSuccess);
                info!(user_id = %user_id, "Logged in");
                Ok(user_id)
            }
            Err(e) => {
                ctx.phase.apply(SessionMachineInput::LoginFailed);
                warn!(error = %e, "Login failed");
                Err(e)
            }
        }
    }

    async fn try_login(&self, username: &str, password: &str) -> AuthResult<UserId> {
        let ctx = &self.ctx;
        let request = ApiRequest::post(Endpoint::Login.path())
            .json(json!({ "username": username, "password": password }));
        let response = ctx.send_decorated(&request).await?;

        if response.is_auth_failure() {
            return Err(AuthError::InvalidCredentials(response.error_message()));
        }
        if !response.is_success() {
            return Err(AuthError::Rejected {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }

        let body = response.json_value();
        if let Some(body) = &body {
            ctx.persist_lifetimes(&lifetimes_from(body));
            if let Some(user_id) = user_id_from(body) {
                return Ok(user_id);
            }
        }

        // Cookies are the authority; an unreadable body still means success.
        debug!(body = %response.summary(), "Login body carried no user id; asking server");
        match ctx.confirm_session().await {
            Confirmation::Confirmed(Some(user_id)) => Ok(user_id),
            _ => Err(AuthError::UnexpectedResponse(
                "login succeeded but the user id could not be determined".to_string(),
            )),
        }
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> AuthResult<()> {
        require_non_empty("username", username)?;
        require_non_empty("email", email)?;
        require_non_empty("password", password)?;
        if !email.contains('@') {
            return Err(AuthError::InvalidInput("email address is not valid".to_string()));
        }

        let request = ApiRequest::post(Endpoint::Register.path()).json(json!({
            "username": username.trim(),
            "email": email.trim(),
            "password": password,
        }));
        let response = self.ctx.send_decorated(&request).await?;
        if !response.is_success() {
            return Err(AuthError::Registration(response.error_message()));
        }
        info!(username = %username.trim(), "Account registered");
        Ok(())
    }

    /// End the session. Local state is cleared even if the server call fails.
    pub async fn logout(&self) {
        self.ctx.logout().await;
    }

    // ==========================================
    // Session-scoped endpoints
    // ==========================================

    fn require_session(&self) -> AuthResult<()> {
        if self.ctx.credentials.get().is_authenticated()
            || self.ctx.read_pair().has_session_hints()
        {
            Ok(())
        } else {
            Err(AuthError::NotLoggedIn)
        }
    }

    fn reject(response: &ApiResponse) -> AuthError {
        AuthError::Rejected {
            status: response.status.as_u16(),
            message: response.error_message(),
        }
    }

    /// Fetch the current user's profile.
    pub async fn me(&self) -> AuthResult<UserProfile> {
        self.require_session()?;
        let response = self.auth_fetch(&ApiRequest::get(Endpoint::Me.path())).await?;
        if !response.is_success() {
            return Err(Self::reject(&response));
        }

        let profile = response
            .json_value()
            .as_ref()
            .and_then(UserProfile::from_value)
            .ok_or_else(|| AuthError::UnexpectedResponse(response.summary()))?;
        self.ctx.adopt_identity(profile.id.clone());
        Ok(profile)
    }

    /// Change the session lifetimes. The server re-issues both tokens.
    pub async fn update_token_settings(
        &self,
        settings: TokenSettings,
    ) -> AuthResult<SessionLifetimes> {
        settings.validate()?;
        self.require_session()?;

        let request = ApiRequest::put(Endpoint::TokenSettings.path()).json(json!({
            "token_lifetime": settings.token_lifetime,
            "refresh_token_lifetime": settings.refresh_token_lifetime,
        }));
        let response = self.auth_fetch(&request).await?;
        if !response.is_success() {
            return Err(Self::reject(&response));
        }

        let mut lifetimes = response
            .json_value()
            .as_ref()
            .map(lifetimes_from)
            .unwrap_or_default();
        lifetimes
            .token_lifetime
            .get_or_insert(settings.token_lifetime);
        lifetimes
            .refresh_token_lifetime
            .get_or_insert(settings.refresh_token_lifetime);
        self.ctx.persist_lifetimes(&lifetimes);
        info!(
            token_lifetime = settings.token_lifetime,
            refresh_token_lifetime = settings.refresh_token_lifetime,
            "Token settings updated"
        );
        Ok(lifetimes)
    }

    /// Server-side diagnostics for the current tokens.
    pub async fn token_info(&self) -> AuthResult<serde_json::Value> {
        self.require_session()?;
        let response = self
            .auth_fetch(&ApiRequest::get(Endpoint::TokenInfo.path()))
            .await?;
        if !response.is_success() {
            return Err(Self::reject(&response));
        }
        response
            .json_value()
            .ok_or_else(|| AuthError::UnexpectedResponse(response.summary()))
    }

    // ==========================================
    // Accessors
    // ==========================================

    pub fn credentials(&self) -> &CredentialStore {
        &self.ctx.credentials
    }

    pub fn credential_state(&self) -> CredentialState {
        self.ctx.credentials.get()
    }

    pub fn activity(&self) -> &ActivityMonitor {
        &self.ctx.activity
    }

    /// Record a user interaction.
    pub fn touch(&self) {
        self.ctx.activity.touch();
    }

    pub fn phase(&self) -> SessionPhase {
        self.ctx.phase.current()
    }

    pub fn anti_forgery_pair(&self) -> AntiForgeryPair {
        self.ctx.read_pair()
    }

    pub fn device_fingerprint(&self) -> String {
        self.ctx.fingerprint.get_or_create()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.ctx.policy
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let ctx = &self.ctx;
        let pair = ctx.read_pair();
        let lifetimes = ctx.store.lifetimes().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read session lifetimes");
            SessionLifetimes::default()
        });
        let last_activity = ctx.activity.last_activity();

        SessionSnapshot {
            phase: ctx.phase.current(),
            user_id: ctx.credentials.get().user_id().cloned(),
            last_activity: DateTime::from_timestamp_millis(last_activity),
            idle_secs: ctx.activity.idle_for(now_millis()).as_secs(),
            has_access_token: pair.access_token.is_some(),
            has_refresh_token: pair.refresh_token.is_some(),
            nonce_issued_at: pair.nonce_issued_at(),
            lifetimes,
            refresh_in_flight: self.refresh.is_in_flight(),
            last_refresh_at: self
                .refresh
                .last_attempt_at()
                .and_then(DateTime::from_timestamp_millis),
        }
    }
}
