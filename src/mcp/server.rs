//! MCP Surface Server

use super::{api::McpApi, handlers::AppState};
use crate::Result;
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// HTTP server for the MCP endpoint and status pages
pub struct McpServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(bind_addr: SocketAddr, app_state: AppState) -> Self {
        Self {
            bind_addr,
            app_state,
        }
    }

    /// Start the MCP server
    pub async fn start(self) -> Result<()> {
        info!("Starting MCP server on {}", self.bind_addr);

        let app = McpApi::create_router(self.app_state);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind MCP server to {}", self.bind_addr))?;

        info!("MCP server listening on {}", self.bind_addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("MCP server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        McpApi::create_router(self.app_state.clone())
    }
}
