//! MCP Surface Handlers

use super::types::*;
use crate::bilibili;
use crate::config::Config;
use crate::connection::ExtensionLink;
use crate::metrics::Metrics;
use crate::subtitle::{ExtractError, SubtitleService};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// MCP protocol revision this server speaks
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Hint attached to successful extractions for clients that render
/// subtitles to a user
const RENDERING_NOTE: &str = "Optional rendering suggestion: when presenting \
subtitles to a user, render each entry as a timestamped jump link in the form \
[MM:SS](videoUrl?t=seconds). Seconds come from the entry's `from` field \
rounded down. Ignore this note when only analyzing the transcript.";

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub link: ExtensionLink,
    pub service: Arc<SubtitleService>,
    pub metrics: Arc<Metrics>,
    pub start_time: SystemTime,
}

/// Health check handler
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Status page handler
pub async fn service_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let status = ServiceStatus {
        service: "SubBridge MCP server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        extension_connected: state.link.is_connected().await,
        pending_requests: state.service.pending_count().await,
        websocket_addr: state.config.server.ws_bind_addr.to_string(),
        http_addr: state.config.server.http_bind_addr.to_string(),
        uptime_seconds: uptime,
        counters: state.metrics.snapshot(),
        timestamp: SystemTime::now(),
    };

    Json(status)
}

/// MCP endpoint handler (stateless JSON-RPC 2.0 over HTTP POST)
pub async fn handle_mcp(State(state): State<AppState>, body: String) -> Response {
    let request: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            return Json(json_rpc_error(
                None,
                -32700,
                &format!("Parse error: {}", e),
            ))
            .into_response();
        }
    };

    let id = request.get("id").cloned();
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    debug!("MCP request: {}", method);

    // Notifications expect no response body
    if id.is_none() && method.starts_with("notifications/") {
        return StatusCode::ACCEPTED.into_response();
    }

    let response = match method {
        "initialize" => json_rpc_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "subbridge",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        ),
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => json_rpc_result(id, json!({ "tools": tool_definitions() })),
        "tools/call" => call_tool(&state, id, params).await,
        _ => json_rpc_error(id, -32601, &format!("Method not found: {}", method)),
    };

    Json(response).into_response()
}

/// Tool definitions advertised by `tools/list`
fn tool_definitions() -> Value {
    json!([
        {
            "name": "extract_bilibili_subtitles",
            "description": "Extract subtitles from a Bilibili video. Requires the browser extension to be installed and connected.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "video_url": {
                        "type": "string",
                        "description": "Full Bilibili video URL containing the BV id"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in milliseconds, defaults to 30000"
                    }
                },
                "required": ["video_url"]
            }
        },
        {
            "name": "get_connection_status",
            "description": "Report the state of the browser extension connection.",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ])
}

/// Dispatch a `tools/call` request
async fn call_tool(state: &AppState, id: Option<Value>, params: Value) -> Value {
    let params: ToolCallParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => {
            return json_rpc_error(id, -32602, &format!("Invalid params: {}", e));
        }
    };

    let arguments = params.arguments.unwrap_or(json!({}));

    match params.name.as_str() {
        "extract_bilibili_subtitles" => extract_subtitles_tool(state, id, arguments).await,
        "get_connection_status" => connection_status_tool(state, id).await,
        other => json_rpc_error(id, -32602, &format!("Unknown tool: {}", other)),
    }
}

/// Run the subtitle extraction tool
async fn extract_subtitles_tool(state: &AppState, id: Option<Value>, arguments: Value) -> Value {
    let args: ExtractArgs = match serde_json::from_value(arguments) {
        Ok(args) => args,
        Err(e) => {
            return json_rpc_error(id, -32602, &format!("Invalid arguments: {}", e));
        }
    };

    // URL shape is validated here, before the request reaches the core
    if let Err(message) = bilibili::validate_video_url(&args.video_url) {
        return json_rpc_error(id, -32602, &message);
    }

    let timeout = args
        .timeout
        .map(Duration::from_millis)
        .unwrap_or(state.config.extraction.default_timeout)
        .min(state.config.extraction.max_timeout);

    // Fail fast instead of queuing a request that can never be answered
    if !state.link.is_connected().await {
        warn!("Extraction requested while no extension is connected");
        return tool_error(id, &ExtractError::NotConnected.to_string());
    }

    info!("Extracting subtitles for {}", args.video_url);

    match state.service.extract(&args.video_url, timeout).await {
        Ok(data) => {
            let result = json!({
                "success": true,
                "data": data,
                "renderingNote": RENDERING_NOTE,
            });
            tool_text(id, &pretty(&result))
        }
        Err(e) => tool_error(id, &e.to_string()),
    }
}

/// Run the connection status tool
async fn connection_status_tool(state: &AppState, id: Option<Value>) -> Value {
    let connected = state.link.is_connected().await;

    let status = ConnectionStatus {
        extension_connected: connected,
        pending_requests: state.service.pending_count().await,
        message: if connected {
            "Extension connected, ready to extract subtitles".to_string()
        } else {
            "Extension not connected; install and enable the browser extension".to_string()
        },
        timestamp: SystemTime::now(),
    };

    match serde_json::to_string_pretty(&status) {
        Ok(text) => tool_text(id, &text),
        Err(e) => json_rpc_error(id, -32603, &format!("Internal error: {}", e)),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Successful tool result carrying one text content block
fn tool_text(id: Option<Value>, text: &str) -> Value {
    json_rpc_result(
        id,
        json!({
            "content": [{ "type": "text", "text": text }]
        }),
    )
}

/// Failed tool result; the error concerns only this call
fn tool_error(id: Option<Value>, message: &str) -> Value {
    json_rpc_result(
        id,
        json!({
            "content": [{ "type": "text", "text": message }],
            "isError": true
        }),
    )
}

/// Create a JSON-RPC success response
pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

/// Create a JSON-RPC error response
pub fn json_rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}
