//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub extraction: ExtractionConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// WebSocket listener the browser extension connects to
    pub ws_bind_addr: SocketAddr,
    /// HTTP listener serving the MCP endpoint and status page
    pub http_bind_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Extraction request configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Timeout applied when a tool call does not specify one
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Upper bound on caller-supplied timeouts
    #[serde(with = "humantime_serde")]
    pub max_timeout: Duration,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                ws_bind_addr: "127.0.0.1:8080".parse().unwrap(),
                http_bind_addr: "127.0.0.1:3456".parse().unwrap(),
                shutdown_timeout: Duration::from_secs(5),
            },
            extraction: ExtractionConfig {
                default_timeout: Duration::from_secs(30),
                max_timeout: Duration::from_secs(300),
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
            },
        }
    }
}
