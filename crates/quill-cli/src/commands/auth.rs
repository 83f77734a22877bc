//! Account commands.

use super::prompt;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use quill_session::SessionClient;
use serde_json::json;

/// Login with username and password.
pub async fn login(client: &SessionClient, format: &OutputFormat) -> Result<()> {
    if let Some(user_id) = client.credential_state().user_id() {
        output::print_success(&format!("Already logged in as user {}", user_id), format);
        return Ok(());
    }

    let username = prompt("Username: ")?;
    if username.is_empty() {
        bail!("Username is required");
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password is required");
    }

    let user_id = client.login(&username, &password).await?;
    output::print_success(&format!("Logged in as {} (user {})", username, user_id), format);
    Ok(())
}

/// Create an account.
pub async fn register(client: &SessionClient, format: &OutputFormat) -> Result<()> {
    let username = prompt("Username: ")?;
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    client.register(&username, &email, &password).await?;
    output::print_success(
        &format!("Account {} created. Run 'quill login' to sign in.", username),
        format,
    );
    Ok(())
}

/// Logout and clear local session state.
pub async fn logout(client: &SessionClient, format: &OutputFormat) -> Result<()> {
    let was_logged_in = client.credential_state().is_authenticated();
    client.logout().await;
    if was_logged_in {
        output::print_success("Logged out successfully", format);
    } else {
        output::print_success("Not logged in; local session state cleared", format);
    }
    Ok(())
}

/// Show the session snapshot.
pub async fn status(client: &SessionClient, format: &OutputFormat) -> Result<()> {
    let snapshot = client.snapshot();

    match format {
        OutputFormat::Text => {
            output::print_heading("Session");
            output::print_row("Phase", &snapshot.phase.to_string());
            match &snapshot.user_id {
                Some(user_id) => {
                    output::print_row("Auth", "logged in");
                    output::print_row("User ID", user_id.as_str());
                }
                None => output::print_row("Auth", "not logged in"),
            }
            output::print_row("Access token", yes_no(snapshot.has_access_token));
            output::print_row("Refresh token", yes_no(snapshot.has_refresh_token));
            if let Some(issued) = snapshot.nonce_issued_at {
                output::print_row("Nonce issued", &issued.to_rfc3339());
            }
            if let Some(seconds) = snapshot.lifetimes.token_lifetime {
                output::print_row("Token lifetime", &output::format_seconds(seconds));
            }
            if let Some(seconds) = snapshot.lifetimes.refresh_token_lifetime {
                output::print_row("Refresh lifetime", &output::format_seconds(seconds));
            }
            if let Some(at) = snapshot.last_refresh_at {
                output::print_row("Last refresh", &at.to_rfc3339());
            }
        }
        OutputFormat::Json => output::print_json(&json!({
            "logged_in": snapshot.user_id.is_some(),
            "session": snapshot,
        }))?,
    }
    Ok(())
}

fn yes_no(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "absent"
    }
}
