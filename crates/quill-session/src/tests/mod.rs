//! Scenario tests for the session coordinator against an in-process fake API.
//!
//! - `harness.rs`   - `FakeServer` (transport + cookie jar) and fixtures
//! - `refresh.rs`   - single-flight refresh, token rotation, failure modes
//! - `dispatch.rs`  - header attachment, refresh-and-retry, forced logout
//! - `bootstrap.rs` - persisted records, cookie hints, idempotence
//! - `flows.rs`     - login, register, logout, profile and token settings

pub(crate) mod harness;
mod refresh;
