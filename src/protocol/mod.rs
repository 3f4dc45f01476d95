//! Bridge Wire Protocol
//!
//! JSON text frames exchanged with the browser extension over the
//! WebSocket connection.

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;
