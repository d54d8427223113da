//! Prometheus metrics for the clients service.
//!
//! Metrics are registered against an explicit [`prometheus::Registry`] under
//! the application's subsystem prefix:
//! - PostgreSQL query, transaction and connection metrics ([`PgMetrics`])
//! - HTTP request metrics ([`HttpMetrics`])
//! - Application info gauge

mod helpers;
mod http;
mod pg;

pub use helpers::{encode_metrics, register_application_info};
pub use http::{normalize_method, HttpMetrics};
pub use pg::PgMetrics;

/// Buckets shared by the PostgreSQL duration histograms, in seconds.
pub const PG_DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5];

/// HTTP handler latency buckets, in seconds.
pub const HTTP_DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.2, 0.4, 0.6, 1.0, 1.5, 2.0];
