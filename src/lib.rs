// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules at the crate root
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::postgres;

// Domain layer (business logic)
pub mod domain;

// Application layer
pub mod api;
pub mod health;
pub mod server;

// Supporting modules
pub mod shutdown;
pub mod telemetry;
