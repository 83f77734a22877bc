//! Commands that need an authenticated session.

use crate::output::{self, OutputFormat};
use anyhow::{bail, Context, Result};
use quill_session::{ApiRequest, Method, SessionClient, TokenSettings};

/// Parse an HTTP method name, case-insensitively.
fn parse_method(name: &str) -> Result<Method> {
    match name.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => bail!("Unsupported method: {}", other),
    }
}

/// Show the current user's profile.
pub async fn me(client: &SessionClient, format: &OutputFormat) -> Result<()> {
    let profile = client.me().await?;
    match format {
        OutputFormat::Text => {
            output::print_heading("Profile");
            output::print_row("ID", profile.id.as_str());
            output::print_row("Username", profile.username.as_deref().unwrap_or("-"));
            output::print_row("Email", profile.email.as_deref().unwrap_or("-"));
            for (key, value) in &profile.extra {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                output::print_row(key, &value);
            }
        }
        OutputFormat::Json => output::print_json(&profile)?,
    }
    Ok(())
}

/// Send an arbitrary authenticated request and print the response body.
pub async fn request(
    client: &SessionClient,
    method: &str,
    path: &str,
    data: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let method = parse_method(method)?;
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body = serde_json::from_str(data).context("--data must be valid JSON")?;
        request = request.json(body);
    }

    let response = client.auth_fetch(&request).await?;
    match format {
        OutputFormat::Text => {
            println!("HTTP {}", response.status);
            match response.json_value() {
                Some(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                None => println!("{}", response.text()),
            }
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "status": response.status.as_u16(),
            "body": response.json_value().unwrap_or_else(|| response.text().into()),
        }))?,
    }

    if !response.is_success() {
        bail!("Request failed: {}", response.error_message());
    }
    Ok(())
}

/// Change access and refresh token lifetimes.
pub async fn token_settings(
    client: &SessionClient,
    access_secs: u64,
    refresh_secs: u64,
    format: &OutputFormat,
) -> Result<()> {
    let lifetimes = client
        .update_token_settings(TokenSettings {
            token_lifetime: access_secs,
            refresh_token_lifetime: refresh_secs,
        })
        .await?;

    match format {
        OutputFormat::Text => {
            output::print_success("Token settings updated", format);
            if let Some(seconds) = lifetimes.token_lifetime {
                output::print_row("Token lifetime", &output::format_seconds(seconds));
            }
            if let Some(seconds) = lifetimes.refresh_token_lifetime {
                output::print_row("Refresh lifetime", &output::format_seconds(seconds));
            }
        }
        OutputFormat::Json => output::print_json(&lifetimes)?,
    }
    Ok(())
}

/// Print the server's view of the current tokens.
pub async fn token_info(client: &SessionClient, format: &OutputFormat) -> Result<()> {
    let info = client.token_info().await?;
    match format {
        OutputFormat::Text => {
            output::print_heading("Token info");
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Json => output::print_json(&info)?,
    }
    Ok(())
}
