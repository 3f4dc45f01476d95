//! Extraction Errors

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to a single extraction caller.
///
/// Every variant concerns exactly one request; one caller's failure never
/// affects another's in-flight request.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No browser extension is attached to the bridge
    #[error("browser extension is not connected; install and enable the extension, then retry")]
    NotConnected,

    /// The deadline elapsed before the extension replied
    #[error("subtitle extraction timed out after {0:?}; check that the extension is running")]
    Timeout(Duration),

    /// The extension reported an error for this request, passed through verbatim
    #[error("{0}")]
    Remote(String),

    /// The response violated the wire contract
    #[error("protocol violation: {0}")]
    Protocol(String),
}
