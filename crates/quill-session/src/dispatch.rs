use crate::context::{now_millis, SessionContext};
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::transport::{ApiRequest, ApiResponse};
use crate::{AuthError, AuthResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Authenticated request dispatch with one refresh-and-retry on 401/403.
pub(crate) struct AuthDispatcher {
    ctx: Arc<SessionContext>,
    refresh: Arc<RefreshCoordinator>,
}

impl AuthDispatcher {
    pub fn new(ctx: Arc<SessionContext>, refresh: Arc<RefreshCoordinator>) -> Self {
        Self { ctx, refresh }
    }

    /// Send `request` with session headers.
    ///
    /// Transport failures propagate unchanged. An authorization failure
    /// triggers a refresh; on success the request is re-sent exactly once
    /// with the rotated tokens and that response is returned whatever its
    /// status. When the refresh fails the session is logged out and the
    /// error says whether the user had been idle past the threshold. A
    /// caller that stopped waiting on another caller's refresh gets the
    /// original response back and the session is left alone.
    pub async fn auth_fetch(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let response = self.ctx.send_decorated(request).await?;
        if !response.is_auth_failure() {
            return Ok(response);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            status = %response.status,
            "Authorization failed; refreshing session"
        );

        match self.refresh.refresh_outcome().await {
            RefreshOutcome::Renewed => {}
            RefreshOutcome::StillPending => {
                warn!(
                    path = %request.path,
                    status = %response.status,
                    "Refresh still in flight; returning original response"
                );
                return Ok(response);
            }
            RefreshOutcome::Failed => return Err(self.end_session().await),
        }

        let retried = self.ctx.send_decorated(request).await?;
        if retried.is_auth_failure() {
            warn!(
                path = %request.path,
                status = %retried.status,
                "Request still unauthorized after refresh"
            );
        }
        Ok(retried)
    }

    /// Log out after an unrecoverable refresh failure and pick the error.
    async fn end_session(&self) -> AuthError {
        let idle = self.ctx.activity.idle_for(now_millis());
        let inactive = idle > self.ctx.policy.inactivity_threshold;
        info!(
            idle_secs = idle.as_secs(),
            inactive, "Refresh failed; ending session"
        );
        self.ctx.logout().await;

        if inactive {
            AuthError::InactivityLogout
        } else {
            AuthError::SessionExpired
        }
    }
}
