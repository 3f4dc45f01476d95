//! SubBridge - MCP Bridge Server
//!
//! Bridges MCP tool calls to a browser extension over a single exclusive
//! WebSocket connection, for extracting subtitles from Bilibili videos.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subbridge::{
    config::ConfigManager,
    events::EventBus,
    mcp::{AppState, McpServer},
    metrics::Metrics,
    ConnectionManager, ShutdownCoordinator, SubtitleService,
};

/// CLI arguments for SubBridge
#[derive(Parser, Debug)]
#[command(name = "subbridge")]
#[command(about = "SubBridge - MCP bridge server for Bilibili subtitle extraction")]
#[command(version)]
#[command(long_about = "
SubBridge - MCP bridge server for Bilibili subtitle extraction

Exposes subtitle extraction as MCP tools over HTTP and fulfils each tool
call through a browser extension connected over WebSocket.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SUBBRIDGE_WS_ADDR           - WebSocket bind address (e.g., 127.0.0.1:8080)
  SUBBRIDGE_HTTP_ADDR         - HTTP bind address (e.g., 127.0.0.1:3456)
  SUBBRIDGE_DEFAULT_TIMEOUT   - Default extraction timeout (e.g., 30s)
  SUBBRIDGE_SHUTDOWN_TIMEOUT  - Graceful shutdown timeout (e.g., 5s)
  SUBBRIDGE_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
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

    /// WebSocket port for the browser extension (overrides config file)
    #[arg(long, help = "WebSocket port for the browser extension")]
    pub ws_port: Option<u16>,

    /// HTTP port for the MCP endpoint (overrides config file)
    #[arg(long, help = "HTTP port for the MCP endpoint")]
    pub http_port: Option<u16>,

    /// Default extraction timeout in seconds (overrides config file)
    #[arg(long, help = "Default extraction timeout in seconds")]
    pub default_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

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

    // Initialize tracing
    init_tracing(&args)?;

    info!(
        "Starting SubBridge v{} - MCP bridge server",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    };

    // Apply CLI argument overrides (highest priority)
    config.merge_with_cli_args(args.ws_port, args.http_port, args.default_timeout);

    // Final validation after all overrides
    config
        .validate()
        .context("Final configuration validation failed")?;

    // If validate-config flag is set, just validate and exit
    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  WebSocket address: {}", config.server.ws_bind_addr);
        info!("  HTTP address: {}", config.server.http_bind_addr);
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        info!(
            "  Default extraction timeout: {:?}",
            config.extraction.default_timeout
        );
        info!(
            "  Max extraction timeout: {:?}",
            config.extraction.max_timeout
        );
        return Ok(());
    }

    info!("Configuration loaded successfully");
    info!("WebSocket address: {}", config.server.ws_bind_addr);
    info!("HTTP address: {}", config.server.http_bind_addr);

    // Create shutdown coordinator
    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    // Shared plumbing: event bus, metrics, and configuration
    let events = EventBus::default();
    let metrics = Arc::new(Metrics::new());
    let config_arc = Arc::new(config.clone());

    // Subtitle service consumes extraction results from the event bus
    let subtitle_service = Arc::new(SubtitleService::new(events.clone(), metrics.clone()));
    let service_listener = Arc::clone(&subtitle_service).spawn_listener();

    // Connection manager owns the extension-facing WebSocket listener
    let connection_manager =
        ConnectionManager::new(Arc::clone(&config_arc), events.clone(), metrics.clone());
    let link = connection_manager.link();

    // Start the MCP server
    let app_state = AppState {
        config: Arc::clone(&config_arc),
        link,
        service: Arc::clone(&subtitle_service),
        metrics: Arc::clone(&metrics),
        start_time: SystemTime::now(),
    };
    let mcp_server = McpServer::new(config.server.http_bind_addr, app_state);
    let mcp_handle = tokio::spawn(async move {
        if let Err(e) = mcp_server.start().await {
            error!("MCP server error: {}", e);
        }
    });

    // Create a channel to communicate with the server task
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Start the WebSocket server in a separate task
    let server_handle = tokio::spawn(async move {
        let mut manager = connection_manager;

        tokio::select! {
            result = manager.start() => {
                if let Err(e) = result {
                    error!("WebSocket server error: {}", e);
                }
            }
            _ = shutdown_rx => {
                info!("Server task received shutdown signal");
                manager.shutdown().await;
            }
        }
    });

    info!("SubBridge started successfully");
    info!("Waiting for the browser extension to connect");
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    // Start listening for shutdown signals
    let signal_result = shutdown_coordinator.listen_for_signals().await;
    if let Err(e) = signal_result {
        error!("Error setting up signal handlers: {}", e);
    }

    // Initiate graceful shutdown
    info!("Initiating graceful shutdown...");

    // Give in-flight extractions a bounded window to settle
    if let Err(e) = shutdown_coordinator
        .wait_for_pending_requests(&subtitle_service)
        .await
    {
        error!("Error while draining pending requests: {}", e);
    }

    // Send shutdown signal to the WebSocket server task
    if shutdown_tx.send(()).is_err() {
        warn!("Failed to send shutdown signal to server task");
    }

    // Wait for server task to complete
    if let Err(e) = server_handle.await {
        if !e.is_cancelled() {
            error!("Server task failed: {}", e);
        }
    }

    // Shutdown the MCP server and the event listener
    mcp_handle.abort();
    service_listener.abort();
    info!("MCP server shutdown");

    info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
