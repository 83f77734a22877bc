//! Session phase state machine using rust-fsm.
//!
//! The phase is a reporting view over the credential state: it records
//! which flow (bootstrap, login, refresh, logout) last touched the session
//! and how it ended. Authorization decisions are made from
//! [`crate::CredentialState`], never from the phase.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────┐
//!                 │   Unknown   │ (initial)
//!                 └──────┬──────┘
//!        Bootstrap       │        NoSession
//!          ┌─────────────┴──────────────┐
//!          ▼                            ▼
//!   ┌─────────────┐  ServerRejected ┌─────────────┐  LoginAttempt  ┌─────────────┐
//!   │ Validating  │ ──────────────► │  Anonymous  │ ─────────────► │  LoggingIn  │
//!   └──────┬──────┘                 └─────────────┘ ◄───────────── └──────┬──────┘
//!          │ ServerConfirmed               ▲          LoginFailed         │
//!          ▼                               │ LogoutComplete               │ LoginSuccess
//!   ┌─────────────┐  LogoutRequested ┌─────┴───────┐                      │
//!   │  LoggedIn   │ ───────────────► │ LoggingOut  │                      │
//!   └──────┬──────┘ ◄────────────────┴─────────────┴──────────────────────┘
//!          │ RefreshStarted    ▲ RefreshSucceeded
//!          ▼                   │
//!   ┌─────────────┐ ───────────┘       RefreshFailed     ┌─────────────┐
//!   │ Refreshing  │ ───────────────────────────────────► │   Expired   │
//!   └─────────────┘                                      └─────────────┘
//! ```

use parking_lot::Mutex;
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unknown)

    Unknown => {
        Bootstrap => Validating,
        NoSession => Anonymous,
        LoginAttempt => LoggingIn,
        RefreshStarted => Refreshing,
        LogoutRequested => LoggingOut
    },
    Validating => {
        ServerConfirmed => LoggedIn,
        ServerRejected => Anonymous,
        NoSession => Anonymous,
        // Cookie hints without a confirmed identity
        RefreshStarted => Refreshing,
        LogoutRequested => LoggingOut
    },
    Anonymous => {
        Bootstrap => Validating,
        LoginAttempt => LoggingIn,
        RefreshStarted => Refreshing,
        LogoutRequested => LoggingOut
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => Anonymous,
        LogoutRequested => LoggingOut
    },
    LoggedIn => {
        ServerConfirmed => LoggedIn,
        ServerRejected => Anonymous,
        RefreshStarted => Refreshing,
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut
    },
    Refreshing => {
        RefreshSucceeded => LoggedIn,
        RefreshFailed => Expired,
        LogoutRequested => LoggingOut
    },
    Expired => {
        RefreshStarted => Refreshing,
        ServerRejected => Anonymous,
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut
    },
    LoggingOut => {
        LogoutComplete => Anonymous
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Serializable view of the session phase for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Bootstrap has not run.
    Unknown,
    /// Bootstrap is reconciling local hints with the server.
    Validating,
    /// No session.
    Anonymous,
    /// Login request in flight.
    LoggingIn,
    /// Session confirmed.
    LoggedIn,
    /// Refresh request in flight.
    Refreshing,
    /// The last refresh failed; a logout normally follows.
    Expired,
    /// Logout in progress.
    LoggingOut,
}

impl SessionPhase {
    /// Returns true only for a confirmed session.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionPhase::LoggedIn)
    }

    /// Returns true while a flow is in progress.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionPhase::Validating
                | SessionPhase::LoggingIn
                | SessionPhase::Refreshing
                | SessionPhase::LoggingOut
        )
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unknown => SessionPhase::Unknown,
            SessionMachineState::Validating => SessionPhase::Validating,
            SessionMachineState::Anonymous => SessionPhase::Anonymous,
            SessionMachineState::LoggingIn => SessionPhase::LoggingIn,
            SessionMachineState::LoggedIn => SessionPhase::LoggedIn,
            SessionMachineState::Refreshing => SessionPhase::Refreshing,
            SessionMachineState::Expired => SessionPhase::Expired,
            SessionMachineState::LoggingOut => SessionPhase::LoggingOut,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Unknown => "unknown",
            SessionPhase::Validating => "validating",
            SessionPhase::Anonymous => "anonymous",
            SessionPhase::LoggingIn => "logging_in",
            SessionPhase::LoggedIn => "logged_in",
            SessionPhase::Refreshing => "refreshing",
            SessionPhase::Expired => "expired",
            SessionPhase::LoggingOut => "logging_out",
        };
        f.write_str(name)
    }
}

/// Thread-safe holder for the session machine.
///
/// Flows overlap (a refresh can finish while a logout is starting), so
/// transitions are applied leniently: an input the current state does not
/// accept is logged and dropped.
pub(crate) struct PhaseTracker {
    machine: Mutex<SessionMachine>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            machine: Mutex::new(SessionMachine::new()),
        }
    }

    /// Apply `input`, returning the resulting phase.
    pub fn apply(&self, input: SessionMachineInput) -> SessionPhase {
        let mut machine = self.machine.lock();
        let from = SessionPhase::from(machine.state());
        if machine.consume(&input).is_err() {
            debug!(phase = %from, ?input, "Ignoring phase input not valid here");
            return from;
        }
        let to = SessionPhase::from(machine.state());
        if from != to {
            debug!(from = %from, to = %to, "Session phase changed");
        }
        to
    }

    pub fn current(&self) -> SessionPhase {
        SessionPhase::from(self.machine.lock().state())
    }
}
