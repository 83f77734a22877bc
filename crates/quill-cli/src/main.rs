//! Quill CLI - Command-line client for the Quill blogging API.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use quill_config::{init_logging, parse_level, Config, Paths};
use tracing::debug;

/// Quill CLI - Sign in to Quill and call the API with a managed session.
#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill CLI for authentication and API access")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config file value
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// API base URL, overriding config and QUILL_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with username and password
    Login,

    /// Create an account
    Register,

    /// Logout and clear session
    Logout,

    /// Show session status
    Status,

    /// Show the current user's profile
    Me,

    /// Send an authenticated request to the API
    Request {
        /// HTTP method
        method: String,
        /// Path below the API root, e.g. /posts
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Change token lifetimes
    TokenSettings {
        /// Access token lifetime in seconds (300-86400)
        #[arg(long)]
        access: u64,
        /// Refresh token lifetime in seconds (86400-2592000)
        #[arg(long)]
        refresh: u64,
    },

    /// Show server-side token diagnostics
    TokenInfo,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
        config.validate()?;
    }

    let level = parse_level(cli.log_level.as_deref().unwrap_or(&config.log_level))?;
    init_logging("cli", &level.as_str().to_ascii_lowercase(), &paths, false);
    debug!(api = %config.api_base_url, "Starting quill");

    let client = commands::connect(&config, &paths).await?;
    let format = &cli.format;

    match cli.command {
        Commands::Login => commands::login(&client, format).await,
        Commands::Register => commands::register(&client, format).await,
        Commands::Logout => commands::logout(&client, format).await,
        Commands::Status => commands::status(&client, format).await,
        Commands::Me => commands::me(&client, format).await,
        Commands::Request { method, path, data } => {
            commands::request(&client, &method, &path, data.as_deref(), format).await
        }
        Commands::TokenSettings { access, refresh } => {
            commands::token_settings(&client, access, refresh, format).await
        }
        Commands::TokenInfo => commands::token_info(&client, format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&e.to_string(), &format);
        std::process::exit(1);
    }
}
