//! Extension Connection Module
//!
//! Handles WebSocket connection acceptance, exclusivity, and lifecycle for
//! the single browser-extension connection.

pub mod manager;

pub use manager::{ConnectionManager, ExtensionLink};
