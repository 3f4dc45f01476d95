//! MCP Surface Module
//!
//! HTTP front end: the MCP JSON-RPC endpoint, the status page, and the
//! health check.

pub mod api;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::McpApi;
pub use handlers::AppState;
pub use server::McpServer;
