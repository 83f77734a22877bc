//! State shared by the refresh coordinator, dispatcher and bootstrap.

use crate::activity::ActivityMonitor;
use crate::anti_forgery::{AntiForgeryPair, AntiForgeryReader};
use crate::credentials::{CredentialState, CredentialStore};
use crate::fingerprint::FingerprintGenerator;
use crate::payload::{user_id_from, UserId};
use crate::phase::{PhaseTracker, SessionMachineInput};
use crate::policy::SessionPolicy;
use crate::protocol::{Endpoint, CSRF_TOKEN_HEADER, FINGERPRINT_HEADER, SESSION_NONCE_HEADER};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::AuthResult;
use chrono::Utc;
use quill_storage::{ClientStore, PersistedAuthRecord, SessionLifetimes};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Outcome of an identity check against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Confirmation {
    /// Success status. The id is absent when the body could not be read.
    Confirmed(Option<UserId>),
    /// The server answered 401/403.
    Rejected,
    /// Transport failure or a non-auth error status.
    Unreachable,
}

pub(crate) struct SessionContext {
    pub policy: SessionPolicy,
    pub transport: Arc<dyn Transport>,
    pub credentials: CredentialStore,
    pub anti_forgery: AntiForgeryReader,
    pub fingerprint: FingerprintGenerator,
    pub store: ClientStore,
    pub activity: ActivityMonitor,
    pub phase: PhaseTracker,
}

impl SessionContext {
    /// Copy `request` with anti-forgery and fingerprint headers attached.
    ///
    /// Mutating requests get the access-scoped token, or the refresh-scoped
    /// one when the target is the refresh endpoint, plus the nonce when
    /// present. Every request gets the device fingerprint.
    pub fn decorate(&self, request: &ApiRequest) -> ApiRequest {
        let mut decorated = request.clone();
        if request.is_mutating() {
            let pair = self.anti_forgery.read_pair();
            let token = if request.targets(Endpoint::Refresh) {
                pair.refresh_token
            } else {
                pair.access_token
            };
            if let Some(token) = token {
                decorated.set_header(CSRF_TOKEN_HEADER, &token);
            }
            if let Some(nonce) = pair.state_nonce {
                decorated.set_header(SESSION_NONCE_HEADER, &nonce);
            }
        }
        decorated.set_header(FINGERPRINT_HEADER, &self.fingerprint.get_or_create());
        decorated
    }

    /// Decorate and send without any refresh handling.
    pub async fn send_decorated(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        self.transport.send(&self.decorate(request)).await
    }

    pub fn read_pair(&self) -> AntiForgeryPair {
        self.anti_forgery.read_pair()
    }

    /// Record a server-confirmed identity in memory and durable storage.
    pub fn adopt_identity(&self, user_id: UserId) {
        let record = PersistedAuthRecord::new(user_id.as_str(), now_millis());
        if let Err(e) = self.store.save_auth_record(&record) {
            warn!(error = %e, "Failed to persist auth record");
        }
        self.credentials.set(CredentialState::authenticated(user_id));
    }

    pub fn persist_lifetimes(&self, lifetimes: &SessionLifetimes) {
        if lifetimes.is_empty() {
            return;
        }
        if let Err(e) = self.store.save_lifetimes(lifetimes) {
            warn!(error = %e, "Failed to persist session lifetimes");
        }
    }

    /// Forget the session locally: credential state, persisted record,
    /// lifetime hints and anti-forgery cookies.
    pub fn clear_client_state(&self) {
        self.credentials.set(CredentialState::Anonymous);
        if let Err(e) = self.store.clear_session() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.anti_forgery.clear();
    }

    /// Ask the identity endpoint whether the cookies still hold a session.
    pub async fn confirm_session(&self) -> Confirmation {
        let response = match self.send_decorated(&ApiRequest::get(Endpoint::Me.path())).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Session confirmation failed");
                return Confirmation::Unreachable;
            }
        };

        if response.is_auth_failure() {
            debug!(status = %response.status, "Session rejected by server");
            return Confirmation::Rejected;
        }
        if !response.is_success() {
            warn!(status = %response.status, "Session confirmation returned error status");
            return Confirmation::Unreachable;
        }

        let user_id = response.json_value().as_ref().and_then(user_id_from);
        if user_id.is_none() {
            debug!(body = %response.summary(), "Confirmation body carried no user id");
        }
        Confirmation::Confirmed(user_id)
    }

    /// End the session. Local state is cleared even when the server call fails.
    pub async fn logout(&self) {
        self.phase.apply(SessionMachineInput::LogoutRequested);

        match self
            .send_decorated(&ApiRequest::post(Endpoint::Logout.path()))
            .await
        {
            Ok(response) if response.is_success() => debug!("Server session ended"),
            Ok(response) => warn!(status = %response.status, "Logout rejected by server"),
            Err(e) => warn!(error = %e, "Logout request failed"),
        }

        self.clear_client_state();
        self.phase.apply(SessionMachineInput::LogoutComplete);
        info!("Logged out");
    }
}
