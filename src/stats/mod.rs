//! Relay statistics

pub mod metrics;

pub use metrics::{RelayMetrics, ServerStats};
