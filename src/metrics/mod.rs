//! Metrics Module
//!
//! Lightweight counters backing the status surface.

pub mod collector;

pub use collector::{Metrics, MetricsSnapshot};
