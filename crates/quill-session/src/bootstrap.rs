//! One-time reconciliation of local session hints with the server.

use crate::context::{now_millis, Confirmation, SessionContext};
use crate::credentials::CredentialState;
use crate::payload::UserId;
use crate::phase::SessionMachineInput;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use quill_storage::PersistedAuthRecord;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub(crate) struct Bootstrap {
    ctx: Arc<SessionContext>,
    refresh: Arc<RefreshCoordinator>,
    initialized: OnceCell<()>,
}

impl Bootstrap {
    pub fn new(ctx: Arc<SessionContext>, refresh: Arc<RefreshCoordinator>) -> Self {
        Self {
            ctx,
            refresh,
            initialized: OnceCell::new(),
        }
    }

    /// Run bootstrap once per instance. Later and concurrent calls wait for
    /// the first run and do nothing else.
    pub async fn init_auth(&self) {
        self.initialized.get_or_init(|| self.run()).await;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// The persisted record, if present, readable and within the TTL.
    /// Anything else is discarded.
    fn usable_record(&self) -> Option<PersistedAuthRecord> {
        let ctx = &self.ctx;
        let record = match ctx.store.load_auth_record() {
            Ok(record) => record?,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable auth record");
                if let Err(e) = ctx.store.clear_auth_record() {
                    warn!(error = %e, "Failed to delete unreadable auth record");
                }
                return None;
            }
        };

        if record.is_expired(now_millis(), ctx.policy.persisted_auth_ttl) {
            info!(
                age_secs = record.age(now_millis()).as_secs(),
                "Discarding expired auth record"
            );
            if let Err(e) = ctx.store.clear_auth_record() {
                warn!(error = %e, "Failed to delete expired auth record");
            }
            return None;
        }
        Some(record)
    }

    async fn run(&self) {
        let ctx = &self.ctx;
        ctx.phase.apply(SessionMachineInput::Bootstrap);

        let pair = ctx.read_pair();
        let record = self.usable_record();
        debug!(
            cookie_hints = pair.has_session_hints(),
            persisted_record = record.is_some(),
            "Bootstrapping session"
        );

        if let Some(record) = record {
            let user_id = UserId::from(record.user_id);
            ctx.credentials
                .set(CredentialState::authenticated(user_id.clone()));

            match ctx.confirm_session().await {
                Confirmation::Confirmed(confirmed) => {
                    ctx.adopt_identity(confirmed.unwrap_or(user_id));
                    ctx.phase.apply(SessionMachineInput::ServerConfirmed);
                    info!("Restored persisted session");
                }
                outcome => {
                    info!(?outcome, "Persisted session not confirmed; clearing");
                    ctx.clear_client_state();
                    ctx.phase.apply(SessionMachineInput::ServerRejected);
                }
            }
            return;
        }

        if pair.has_session_hints() {
            if let Confirmation::Confirmed(Some(user_id)) = ctx.confirm_session().await {
                ctx.adopt_identity(user_id);
                ctx.phase.apply(SessionMachineInput::ServerConfirmed);
                info!("Confirmed cookie session");
                return;
            }

            match self.refresh.refresh_outcome().await {
                RefreshOutcome::Renewed if self.confirm_after_refresh().await => {
                    info!("Recovered cookie session via refresh");
                    return;
                }
                RefreshOutcome::StillPending => {
                    // The running attempt adopts the identity if it succeeds.
                    info!("Refresh still in flight; leaving cookie session in place");
                    return;
                }
                _ => {}
            }

            info!("Cookie session could not be recovered; clearing");
            ctx.clear_client_state();
            ctx.phase.apply(SessionMachineInput::ServerRejected);
            return;
        }

        ctx.credentials.set(CredentialState::Anonymous);
        ctx.phase.apply(SessionMachineInput::NoSession);
        debug!("No session hints; staying anonymous");
    }

    /// After a successful refresh the identity may already be known from the
    /// refresh body; otherwise ask the server once more.
    async fn confirm_after_refresh(&self) -> bool {
        let ctx = &self.ctx;
        if ctx.credentials.get().is_authenticated() {
            return true;
        }
        match ctx.confirm_session().await {
            Confirmation::Confirmed(Some(user_id)) => {
                ctx.adopt_identity(user_id);
                ctx.phase.apply(SessionMachineInput::ServerConfirmed);
                true
            }
            _ => false,
        }
    }
}
