//! Single-flight session refresh.
//!
//! Callers that arrive while an attempt is running wait for it on an async
//! mutex and share its outcome instead of issuing their own request. The
//! wait is bounded by the throttle window; a caller that times out learns
//! that the attempt is still pending, which is not a failure.

use crate::context::{now_millis, SessionContext};
use crate::payload::{lifetimes_from, user_id_from};
use crate::phase::SessionMachineInput;
use crate::protocol::Endpoint;
use crate::transport::ApiRequest;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How a refresh call ended for its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    Renewed,
    Failed,
    /// Another caller's attempt was still running when the wait expired.
    StillPending,
}

impl RefreshOutcome {
    fn from_settled(renewed: bool) -> Self {
        if renewed {
            Self::Renewed
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Default)]
struct RefreshAttemptState {
    last_outcome: bool,
}

/// Clears the in-flight flag when the attempt settles or is cancelled.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct RefreshCoordinator {
    ctx: Arc<SessionContext>,
    gate: Mutex<RefreshAttemptState>,
    /// Number of attempts that have run to completion.
    settled: AtomicU64,
    in_flight: AtomicBool,
    /// Epoch millis of the most recent attempt start, 0 when none.
    last_attempt_at: AtomicI64,
}

impl RefreshCoordinator {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            gate: Mutex::new(RefreshAttemptState::default()),
            settled: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            last_attempt_at: AtomicI64::new(0),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn last_attempt_at(&self) -> Option<i64> {
        match self.last_attempt_at.load(Ordering::Acquire) {
            0 => None,
            at => Some(at),
        }
    }

    /// Renew the session. Returns false on any failure or when the wait for
    /// an in-flight attempt expired; never errors.
    ///
    /// Does not touch the credential store on failure: the caller decides
    /// whether a failed refresh ends the session.
    pub async fn refresh(&self) -> bool {
        self.refresh_outcome().await == RefreshOutcome::Renewed
    }

    /// Like [`refresh`](Self::refresh), but tells a timed-out waiter apart
    /// from a refresh the server rejected.
    pub async fn refresh_outcome(&self) -> RefreshOutcome {
        let observed = self.settled.load(Ordering::Acquire);

        let mut state =
            match tokio::time::timeout(self.ctx.policy.refresh_throttle, self.gate.lock()).await {
                Ok(state) => state,
                Err(_) => {
                    warn!(
                        waited_ms = self.ctx.policy.refresh_throttle.as_millis() as u64,
                        "Timed out waiting for in-flight refresh"
                    );
                    return RefreshOutcome::StillPending;
                }
            };

        if self.settled.load(Ordering::Acquire) != observed {
            debug!(
                outcome = state.last_outcome,
                "Joined refresh that settled while waiting"
            );
            return RefreshOutcome::from_settled(state.last_outcome);
        }

        let _in_flight = InFlight::start(&self.in_flight);
        self.last_attempt_at.store(now_millis(), Ordering::Release);

        let outcome = self.attempt().await;
        state.last_outcome = outcome;
        self.settled.fetch_add(1, Ordering::AcqRel);
        RefreshOutcome::from_settled(outcome)
    }

    async fn attempt(&self) -> bool {
        let ctx = &self.ctx;
        ctx.phase.apply(SessionMachineInput::RefreshStarted);

        let before = ctx.read_pair();
        if before.refresh_token.is_none() {
            debug!("No refresh token cookie; skipping refresh request");
            ctx.phase.apply(SessionMachineInput::RefreshFailed);
            return false;
        }

        let response = match ctx
            .send_decorated(&ApiRequest::post(Endpoint::Refresh.path()))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                ctx.phase.apply(SessionMachineInput::RefreshFailed);
                return false;
            }
        };

        if !response.is_success() {
            info!(status = %response.status, "Refresh rejected by server");
            ctx.phase.apply(SessionMachineInput::RefreshFailed);
            return false;
        }

        // The server rotates tokens on refresh.
        ctx.anti_forgery.invalidate();
        let after = ctx.read_pair();
        debug!(
            rotated = before != after,
            body = %response.summary(),
            "Refresh succeeded"
        );

        if let Some(body) = response.json_value() {
            ctx.persist_lifetimes(&lifetimes_from(&body));
            if let Some(user_id) = user_id_from(&body) {
                ctx.adopt_identity(user_id);
            }
        }

        ctx.phase.apply(SessionMachineInput::RefreshSucceeded);
        true
    }
}
