//! Protocol Constants

/// Greeting sent to a newly attached extension
pub const WELCOME_MESSAGE: &str = "SubBridge MCP server connected";

/// Close reason sent when a second extension connection is refused
pub const REFUSAL_REASON: &str = "another extension is already connected, retry later";
