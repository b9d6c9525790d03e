//! ads-mcp-gateway: MCP gateway for AI-assisted ads analytics
//!
//! Serves the ads reporting tools to AI assistants as JSON-RPC 2.0 over HTTP,
//! with protocol negotiation, shared-secret auth, account name resolution
//! and upstream retries.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use ads_mcp_gateway::config::{self, Config};
use ads_mcp_gateway::mcp::{router, shutdown_signal, RpcDispatcher};
use ads_mcp_gateway::upstream::{HttpToolBackend, ToolBackend, UnavailableBackend};

/// MCP gateway for AI-assisted ads analytics.
///
/// Exposes campaign, metrics and account tools to AI assistants over a
/// JSON-RPC 2.0 HTTP endpoint.
#[derive(Parser, Debug)]
#[command(name = "ads-mcp-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration (e.g. 127.0.0.1:8080)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the upstream backend, degrading to one that reports the problem
/// on every call so the local tools stay available.
fn build_backend(cfg: &Config) -> Arc<dyn ToolBackend> {
    match HttpToolBackend::from_config(&cfg.upstream) {
        Ok(backend) => {
            info!("Upstream backend configured");
            Arc::new(backend)
        }
        Err(e) => {
            warn!(error = %e, "Upstream backend unavailable, only local tools will work");
            Arc::new(UnavailableBackend::new(e))
        }
    }
}

async fn serve(bind_address: String, dispatcher: Arc<RpcDispatcher>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %listener.local_addr()?, "MCP gateway listening");

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Entry point for the ads-mcp-gateway server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "ads-mcp-gateway {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting ads-mcp-gateway"
    );
    let auth_mode = if cfg.auth.shared_secret.as_deref().is_some_and(|s| !s.is_empty()) {
        "shared-secret"
    } else {
        "open"
    };
    info!(
        supported_versions = ?cfg.protocol.supported_versions,
        auth = auth_mode,
        aliases = cfg.resolver.aliases.len(),
        "Gateway configured"
    );

    let dispatcher = Arc::new(RpcDispatcher::from_config(&cfg, build_backend(&cfg)));
    let bind_address = args.bind.unwrap_or_else(|| cfg.server.bind_address.clone());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(serve(bind_address, dispatcher));

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
