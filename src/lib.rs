//! SubBridge Library
//!
//! MCP bridge server for browser-based Bilibili subtitle extraction.
//!
//! Exposes subtitle extraction as MCP tools over HTTP and fulfils each tool
//! call by round-tripping it over a single exclusive WebSocket connection
//! held by a browser extension.

pub mod bilibili;
pub mod config;
pub mod connection;
pub mod events;
pub mod mcp;
pub mod metrics;
pub mod protocol;
pub mod shutdown;
pub mod subtitle;

pub use config::Config;
pub use connection::ConnectionManager;
pub use events::EventBus;
pub use shutdown::ShutdownCoordinator;
pub use subtitle::SubtitleService;

/// Common error type for the bridge server
pub type Result<T> = anyhow::Result<T>;
