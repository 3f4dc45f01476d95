//! Subtitle Extraction Module
//!
//! Turns the asynchronous request/response protocol into one awaited result
//! per caller, with bounded wait time.

pub mod error;
pub mod service;

pub use error::ExtractError;
pub use service::SubtitleService;
