//! Portico Server - edge HTTP/HTTPS front end
//!
//! This crate wires the cache-aside pipeline, the background invalidation loop
//! and the hash-routed backend pool behind TLS-terminating listeners.

pub mod balancer;
pub mod error;
pub mod handlers;
pub mod invalidation;
pub mod listener;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod origin;
pub mod pipeline;
pub mod server;
pub mod settings;
pub mod state;
pub mod tls;

pub use error::AppError;
pub use handlers::health::HealthResponse;
pub use server::{create_balancer_router, create_router, create_router_with_state, run_server};
pub use settings::ServerConfig;
pub use state::{AppState, BalancerState};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
