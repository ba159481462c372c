//! Metrics module for the Portico edge server.

pub mod cache;
pub mod http;
pub mod setup;

pub use cache::CacheMetrics;
pub use setup::{MetricsError, detached_handle, init_metrics, metrics_handler};
