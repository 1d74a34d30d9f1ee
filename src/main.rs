use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

mod auth;
mod config;
mod error;
mod http_client;
mod middleware;
mod property;
mod routes;

use config::{CliArgs, Command, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // A local .env overrides nothing already set in the environment
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let command = args.command.clone().unwrap_or(Command::Serve);

    // Interactive setup on explicit request, or when no credentials are configured
    if command == Command::Setup
        || (config::needs_interactive_setup() && args.client_id.is_none())
    {
        let interactive_config = config::run_interactive_setup()?;
        if command == Command::Setup {
            return Ok(());
        }

        // Set environment variables from interactive config so CliArgs picks them up
        std::env::set_var("GOOGLE_CLIENT_ID", &interactive_config.client_id);
        std::env::set_var("GOOGLE_CLIENT_SECRET", &interactive_config.client_secret);
        std::env::set_var("SERVER_PORT", &interactive_config.server_port);
        return run(CliArgs::parse(), command).await;
    }

    run(args, command).await
}

async fn run(args: CliArgs, command: Command) -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load(&args)?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Token database: {}", config.token_db_file.display());

    let state = build_state(config)?;

    match command {
        Command::Serve => serve(state).await,
        Command::Login => login(state).await,
        Command::Status => {
            let authenticated = state.tokens.is_authenticated().await;
            let expires_at = state.tokens.expires_at().await.map(|dt| dt.to_rfc3339());
            print_json(&serde_json::json!({
                "authenticated": authenticated,
                "expiresAt": expires_at,
            }))
        }
        Command::Logout => {
            state.tokens.sign_out().await;
            println!("Signed out");
            Ok(())
        }
        Command::Find { domain } => {
            let site_url = state.resolver.find_property_for_domain(&domain).await?;
            print_json(&serde_json::json!({ "domain": domain, "siteUrl": site_url }))
        }
        Command::Detect { domain } => {
            let resolution = state.resolver.detect_primary_property(&domain).await;
            print_json(&resolution)
        }
        Command::Setup => Ok(()),
    }
}

/// Wire the token store, token manager, API client and resolver together
fn build_state(config: Config) -> Result<routes::AppState> {
    tracing::info!("Initializing token storage...");
    let store = Arc::new(auth::SqliteTokenStore::open(&config.token_db_file)?);

    let tokens = Arc::new(auth::TokenManager::new(
        config.oauth_settings(),
        store,
        config.token_refresh_threshold,
    )?);

    let client = Arc::new(http_client::SearchConsoleClient::new(
        tokens.clone(),
        config.api_base_url.clone(),
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    tracing::info!("✅ Search Console client initialized");

    Ok(routes::AppState {
        flows: auth::AuthorizationFlows::new(Duration::from_secs(config.authorization_timeout)),
        resolver: property::PropertyResolver::new(client),
        tokens,
        config: Arc::new(config),
    })
}

async fn serve(state: routes::AppState) -> Result<()> {
    let config = state.config.clone();

    if state.tokens.is_authenticated().await {
        tracing::info!("✅ Stored Search Console session found");
    } else {
        tracing::warn!("No stored session; authorize via POST /auth/start or `gsc-bridge login`");
    }

    let app = build_app(state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Authorize from the terminal
///
/// The callback route has to be reachable for the redirect, so the server runs
/// in the background until the flow settles.
async fn login(state: routes::AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server_host, state.config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let app = build_app(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    println!(
        "Opening the Google consent page (waiting up to {}s)...",
        state.flows.timeout().as_secs()
    );
    let result = state
        .tokens
        .initiate_authorization(&state.flows, &auth::SystemBrowser)
        .await;
    server.abort();

    match result {
        Ok(()) => {
            println!("✅ Signed in to Search Console");
            Ok(())
        }
        Err(e) => {
            tracing::error!("❌ Authorization failed: {}", e);
            Err(e.into())
        }
    }
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    // Health checks and the OAuth redirect target (no key required)
    let public_routes = routes::public_routes(state.clone());

    // Auth and property routes (with key check)
    let api_routes = routes::api_routes(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(middleware::cors_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                     🔎 gsc-bridge                         ║
║                                                           ║
║  Search Console sessions and property resolution          ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:      {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:       http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Redirect URI: {}", config.redirect_uri);
    println!(
        "  API key:      {}",
        if config.bridge_api_key.is_some() {
            "required"
        } else {
            "not configured"
        }
    );
    println!("  Log Level:    {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
