//! Realtime Relay - WebSocket relay for the OpenAI Realtime API
//!
//! Accepts client WebSocket connections on `/realtime`, opens a matching
//! upstream connection carrying the server-side API token, and relays frames
//! in both directions.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use realtime_relay::{
    config::ConfigManager, management::ManagementServer, metrics::Metrics, ConnectionManager,
    RelayEngine, ShutdownCoordinator,
};

/// CLI arguments for Realtime Relay
#[derive(Parser, Debug)]
#[command(name = "realtime-relay")]
#[command(about = "Realtime Relay - WebSocket relay for the OpenAI Realtime API")]
#[command(version)]
#[command(long_about = "
Realtime Relay - WebSocket relay for the OpenAI Realtime API

Clients connect to ws://<host>:<port>/realtime without credentials; the relay
opens the upstream connection with its own bearer token.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables
3. Configuration file
4. Built-in defaults

Environment variables:
  TOKEN                   - Upstream API bearer token (required)
  PORT                    - Listen port (default 8080)
  RELAY_BIND_ADDR         - Bind address (e.g., 0.0.0.0:8080)
  RELAY_UPSTREAM_URL      - Upstream realtime endpoint (ws:// or wss://)
  RELAY_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
  RELAY_SHUTDOWN_TIMEOUT  - Session drain timeout on shutdown (e.g., 30s)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:8080)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Upstream realtime endpoint (overrides config file)
    #[arg(long, help = "Upstream WebSocket URL")]
    pub upstream_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level (defaults to the configured level)")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_filter = init_tracing(&args, args.log_level.as_deref().unwrap_or("info"))?;

    info!(
        "Starting Realtime Relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut config = ConfigManager::load(&args.config)?;
    config
        .merge_with_cli_args(
            args.bind.as_deref(),
            args.port,
            args.upstream_url.as_deref(),
        )
        .context("Invalid command-line override")?;
    if let Some(level) = &args.log_level {
        config.monitoring.log_level = level.clone();
    }

    config
        .validate()
        .context("Final configuration validation failed")?;

    // The configured level is only known once file and environment are merged
    if let Some(filter) = configured_filter(&args, &config.monitoring.log_level) {
        log_filter
            .reload(filter)
            .context("Failed to apply configured log level")?;
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  Path: {}", config.server.path);
        info!("  Upstream: {}", config.upstream.url);
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        info!(
            "  Management API: {}",
            if config.monitoring.management_api.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    info!("Configuration loaded successfully");
    info!("Bind address: {}", config.server.bind_addr);
    info!("Upstream: {}", config.upstream.url);

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new().context("Failed to create metrics registry")?);
    let engine = Arc::new(RelayEngine::new(Arc::clone(&config), metrics));
    let connection_manager = ConnectionManager::new(Arc::clone(&engine));

    let management_handle = if config.monitoring.management_api.enabled {
        let management_server = ManagementServer::new(
            config.monitoring.management_api.bind_addr,
            Arc::clone(&engine),
            connection_manager.shutdown_flag(),
        );

        Some(tokio::spawn(async move {
            if let Err(e) = management_server.start().await {
                error!("Management API server error: {:#}", e);
            }
        }))
    } else {
        info!("Management API server disabled");
        None
    };

    let shutdown_rx = shutdown_coordinator.subscribe();
    let drain_timeout = shutdown_coordinator.timeout();

    let server_handle = tokio::spawn(async move {
        let mut manager = connection_manager;

        if let Err(e) = manager.start(shutdown_rx).await {
            error!("Server error: {:#}", e);
            return;
        }

        manager.initiate_shutdown();
        if let Err(e) = manager.wait_for_sessions_to_close(drain_timeout).await {
            error!("Error during session drain: {}", e);
        }
    });

    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    info!("Initiating graceful shutdown...");

    if let Err(e) = server_handle.await {
        if !e.is_cancelled() {
            error!("Server task failed: {}", e);
        }
    }

    if let Some(handle) = management_handle {
        handle.abort();
        info!("Management API server shutdown");
    }

    info!("Server shutdown complete");

    Ok(())
}

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

/// Initialize tracing/logging with a reloadable filter
fn init_tracing(args: &CliArgs, startup_level: &str) -> Result<LogFilterHandle> {
    let log_level = if args.verbose { "debug" } else { startup_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .init();

    Ok(handle)
}

/// Filter for the level from the merged configuration. `None` when
/// `RUST_LOG` or `--verbose` already decided the level.
fn configured_filter(args: &CliArgs, configured_level: &str) -> Option<EnvFilter> {
    if args.verbose || std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        return None;
    }
    Some(EnvFilter::new(configured_level))
}
