//! Evalon Onboarding CLI
//!
//! Serves the onboarding HTTP API in front of the registration backend.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use evalon_backend::HttpBackend;
use evalon_wizard::{create_router, mock::MockBackend, AppState, Config};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Evalon Onboarding - Registration Wizard Server
///
/// Runs the organisation, teacher and student registration wizards behind an
/// HTTP API for the onboarding UI.
#[derive(Parser, Debug)]
#[command(name = "evalon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: evalon.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port for the HTTP API server
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind the HTTP API server to
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Base URL of the registration backend (without /api)
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Use the in-memory backend instead of a real one
    #[arg(long)]
    offline: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Evalon onboarding starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, wires the backend and serves until Ctrl+C.
async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ref bind) = args.bind {
        config.bind_address.clone_from(bind);
    }
    if let Some(ref url) = args.backend_url {
        config.backend_url.clone_from(url);
    }

    config.validate()?;

    print_config(&config, args.offline);

    let state = if args.offline {
        let backend = Arc::new(MockBackend::new());
        AppState::new(config.clone(), backend.clone(), backend)
    } else {
        let backend = Arc::new(HttpBackend::from_config(&config)?);
        AppState::new(config.clone(), backend.clone(), backend)
    };
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid bind address '{}:{}': {e}\n\nSuggestion: Use an IP address such as 127.0.0.1 with --bind",
                config.bind_address,
                config.port
            )
        })?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Evalon onboarding stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Loads configuration from the specified path or the default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the effective configuration.
fn print_config(config: &Config, offline: bool) {
    println!("Configuration loaded:");
    if offline {
        println!("  Backend: in-memory (offline)");
    } else {
        println!("  Backend: {}", config.backend_url);
        println!("  Request timeout: {}s", config.request_timeout_secs);
    }
    println!("  OTP resend cooldown: {}s", config.otp_resend_cooldown_secs);
    println!("  Default country code: {}", config.default_country_code);
}
