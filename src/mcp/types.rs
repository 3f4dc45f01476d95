//! MCP Surface Types

use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;

/// Parameters of a `tools/call` request
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Arguments of the subtitle extraction tool
#[derive(Debug, Deserialize)]
pub struct ExtractArgs {
    pub video_url: String,
    /// Timeout in milliseconds; the configured default applies when absent
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Status page payload
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub version: String,
    pub extension_connected: bool,
    pub pending_requests: usize,
    pub websocket_addr: String,
    pub http_addr: String,
    pub uptime_seconds: u64,
    pub counters: MetricsSnapshot,
    pub timestamp: SystemTime,
}

/// Payload of the connection status tool
#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub extension_connected: bool,
    pub pending_requests: usize,
    pub message: String,
    pub timestamp: SystemTime,
}
