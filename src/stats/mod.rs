//! Endpoint statistics

pub mod metrics;

pub use metrics::{EndpointStats, StatsSnapshot};
