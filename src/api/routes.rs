use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::client::{create_client, get_client};
use super::health::{liveness, readiness};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Probes
        .route("/health/readiness", get(readiness))
        .route("/health/liveness", get(liveness))
        // Prometheus
        .route("/metrics", get(prometheus_metrics))
        // Client records
        .route("/v1/client", post(create_client))
        .route("/v1/client/{id}", get(get_client))
}
