//! API layer - HTTP endpoint handlers organized by domain.

mod client;
mod health;
mod metrics;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use client::{create_client, get_client};
pub use health::{liveness, readiness};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
