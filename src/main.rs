//! Profile Service - authenticated user profiles over HTTP

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::{debug, error, info, warn};

use profile_service::{
    cli::{Cli, Command},
    config::Config,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap and figment read the environment
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => info!("No .env file found, using process environment"),
        Err(e) => warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(cli: &Cli) -> profile_service::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

/// Print the effective settings with credentials masked
fn check_config(config: &Config) -> ExitCode {
    let mut effective = config.clone();
    effective.store.uri = config.store.redacted_uri();

    let summary = json!({
        "config": effective,
        "issuer": config.auth.issuer_url(),
        "jwks_uri": config.auth.resolved_jwks_uri(),
    });

    match serde_json::to_string_pretty(&summary) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        store = %config.store.backend,
        database = %config.store.database,
        "Starting profile service"
    );

    let server = match Server::new(config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start profile service: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
