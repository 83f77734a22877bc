//! Client-side session coordinator for the Quill API.
//!
//! This crate keeps a cookie-based session authenticated against a server
//! that issues short-lived access credentials and longer-lived refresh
//! credentials guarded by anti-forgery tokens:
//! - Bootstrap reconciles persisted login records and cookie hints with the server
//! - Authenticated dispatch attaches anti-forgery and device headers and retries once
//!   after a single-flight refresh
//! - Inactivity decides whether an unrecoverable failure reads as
//!   "inactivity" or "session expired"
//! - Explicit FSM-based phase tracking for status reporting
//!
//! [`SessionClient`] owns one instance of every component; construct one per
//! logical client.

mod activity;
mod anti_forgery;
mod bootstrap;
mod client;
mod context;
mod cookie_jar;
mod credentials;
mod dispatch;
mod error;
mod fingerprint;
mod payload;
mod phase;
mod policy;
mod protocol;
mod refresh;
mod transport;

#[cfg(test)]
mod tests;

pub use activity::ActivityMonitor;
pub use anti_forgery::{AntiForgeryPair, AntiForgeryReader};
pub use client::{
    SessionClient, SessionSnapshot, TokenSettings, REFRESH_TOKEN_LIFETIME_RANGE,
    TOKEN_LIFETIME_RANGE,
};
pub use cookie_jar::PersistentCookieJar;
pub use credentials::{CredentialState, CredentialStore, Session, Subscription};
pub use error::{AuthError, AuthResult};
pub use fingerprint::{default_probes, EnvironmentProbe, FingerprintGenerator, PROBE_SENTINEL};
pub use payload::{UserId, UserProfile};
pub use phase::{session_machine, SessionMachine, SessionMachineInput, SessionMachineState, SessionPhase};
pub use policy::SessionPolicy;
pub use protocol::Endpoint;
pub use transport::{ApiRequest, ApiResponse, CookieSource, ReqwestTransport, Transport};

pub use reqwest::{Method, StatusCode};
