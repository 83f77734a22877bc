//! CLI command implementations.

mod auth;
mod session;

pub use auth::{login, logout, register, status};
pub use session::{me, request, token_info, token_settings};

use anyhow::Result;
use quill_config::{Config, Paths};
use quill_session::SessionClient;
use std::io::{self, Write};

/// Build a session client from the on-disk configuration and run bootstrap.
///
/// Every invocation counts as user activity.
pub async fn connect(config: &Config, paths: &Paths) -> Result<SessionClient> {
    let client = SessionClient::connect(config, paths)?;
    client.touch();
    client.init_auth().await;
    Ok(client)
}

/// Read one trimmed line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
