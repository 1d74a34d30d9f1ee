use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::io::Write;
use std::path::PathBuf;

use crate::auth::OAuthSettings;

const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";

/// gsc-bridge - Search Console token lifecycle and property resolution
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000", global = true)]
    pub port: u16,

    /// Shared key the dashboard must present (optional)
    #[arg(short = 'k', long, env = "BRIDGE_API_KEY", global = true)]
    pub api_key: Option<String>,

    /// Google OAuth client id
    #[arg(long, env = "GOOGLE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Google OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    /// OAuth redirect URI (defaults to this server's /oauth/callback)
    #[arg(long, env = "GOOGLE_REDIRECT_URI", global = true)]
    pub redirect_uri: Option<String>,

    /// Path to the token SQLite database
    #[arg(short = 'd', long, env = "TOKEN_DB_FILE", global = true)]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Seconds to wait for the consent page before giving up
    #[arg(long, env = "AUTHORIZATION_TIMEOUT", default_value = "300", global = true)]
    pub authorization_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30", global = true)]
    pub http_timeout: u64,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Authorize with Google in the system browser
    Login,
    /// Show whether a usable session exists
    Status,
    /// Clear the stored session
    Logout,
    /// Find the exact property for a domain
    Find { domain: String },
    /// Detect and validate the primary property for a domain
    Detect { domain: String },
    /// Interactive first-time setup
    Setup,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,
    pub bridge_api_key: Option<String>,

    // Google OAuth
    pub google_client_id: String,
    pub google_client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,

    // Search Console API
    pub api_base_url: String,

    // Token storage
    pub token_db_file: PathBuf,

    // Timeouts
    pub token_refresh_threshold: u64,
    pub authorization_timeout: u64,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load(args: &CliArgs) -> Result<Self> {
        let server_host = args.host.clone();
        let server_port = args.port;

        let config = Config {
            bridge_api_key: args.api_key.clone().filter(|k| !k.is_empty()),

            google_client_id: args
                .client_id
                .clone()
                .context("GOOGLE_CLIENT_ID is required (use --client-id or run `gsc-bridge setup`)")?,

            google_client_secret: args.client_secret.clone().context(
                "GOOGLE_CLIENT_SECRET is required (use --client-secret or run `gsc-bridge setup`)",
            )?,

            redirect_uri: args
                .redirect_uri
                .clone()
                .unwrap_or_else(|| format!("http://{}:{}/oauth/callback", display_host(&server_host), server_port)),

            scopes: parse_scopes(&std::env::var("GOOGLE_SCOPES").unwrap_or_default()),

            auth_url: std::env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),

            token_url: std::env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),

            api_base_url: std::env::var("SEARCH_CONSOLE_API_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com".to_string()),

            token_db_file: args
                .db_file
                .as_deref()
                .map(expand_tilde)
                .unwrap_or_else(default_token_db_path),

            token_refresh_threshold: std::env::var("TOKEN_REFRESH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),

            authorization_timeout: args.authorization_timeout,

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level.clone(),

            server_host,
            server_port,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.google_client_id.trim().is_empty() {
            anyhow::bail!("GOOGLE_CLIENT_ID cannot be empty");
        }
        if self.google_client_secret.trim().is_empty() {
            anyhow::bail!("GOOGLE_CLIENT_SECRET cannot be empty");
        }
        url::Url::parse(&self.redirect_uri)
            .with_context(|| format!("GOOGLE_REDIRECT_URI is not a valid URL: {}", self.redirect_uri))?;
        if self.authorization_timeout == 0 {
            anyhow::bail!("AUTHORIZATION_TIMEOUT must be greater than zero");
        }

        Ok(())
    }

    /// OAuth client settings derived from this configuration
    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.google_client_id.clone(),
            client_secret: self.google_client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            auth_url: self.auth_url.clone(),
            token_url: self.token_url.clone(),
        }
    }
}

/// Loopback hosts are shown as localhost so the redirect matches Google's registration
fn display_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "127.0.0.1" | "::" | "::1" => "localhost",
        other => other,
    }
}

/// Parse a space- or comma-separated scope list, falling back to read-only Search Console
fn parse_scopes(s: &str) -> Vec<String> {
    let scopes: Vec<String> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect();

    if scopes.is_empty() {
        vec![DEFAULT_SCOPE.to_string()]
    } else {
        scopes
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Platform data directory, e.g. ~/.local/share/gsc-bridge/tokens.sqlite3
fn default_token_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gsc-bridge")
        .join("tokens.sqlite3")
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and missing client credentials)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();
    let has_client_id = std::env::var("GOOGLE_CLIENT_ID").is_ok();
    let has_client_secret = std::env::var("GOOGLE_CLIENT_SECRET").is_ok();

    !env_file_exists && (!has_client_id || !has_client_secret)
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub server_port: String,
}

/// Run interactive setup to collect the Google OAuth client credentials
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("gsc-bridge first-time setup");
    println!();
    println!("Create an OAuth client (type: Web application) in the Google Cloud console");
    println!("and enable the Search Console API for its project.");
    println!();

    let client_id: String = Input::new()
        .with_prompt("Google OAuth client id (GOOGLE_CLIENT_ID)")
        .interact_text()
        .context("Failed to read GOOGLE_CLIENT_ID")?;

    let client_secret: String = Password::new()
        .with_prompt("Google OAuth client secret (GOOGLE_CLIENT_SECRET)")
        .interact()
        .context("Failed to read GOOGLE_CLIENT_SECRET")?;

    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        anyhow::bail!("Client id and secret cannot be empty");
    }

    let server_port: String = Input::new()
        .with_prompt("Server port")
        .default("8000".to_string())
        .interact_text()
        .context("Failed to read server port")?;

    println!();
    println!(
        "Register this redirect URI on the OAuth client: http://localhost:{}/oauth/callback",
        server_port
    );

    let config = InteractiveConfig {
        client_id,
        client_secret,
        server_port,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!("Configuration saved to .env file");
    }

    Ok(config)
}

/// Render the .env file contents for a setup result
fn render_env_file(config: &InteractiveConfig) -> String {
    format!(
        r#"# gsc-bridge configuration
# Generated by interactive setup

# Google OAuth client (required)
GOOGLE_CLIENT_ID={}
GOOGLE_CLIENT_SECRET={}

# Server settings
SERVER_HOST=127.0.0.1
SERVER_PORT={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.client_id, config.client_secret, config.server_port,
    )
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(render_env_file(config).as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
