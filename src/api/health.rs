//! Readiness and liveness probes.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use crate::health::{HealthCheck, HealthResult};
use crate::server::AppState;

/// GET /health/readiness
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthResult>) {
    probe(&state.readiness).await
}

/// GET /health/liveness
pub async fn liveness(State(state): State<AppState>) -> (StatusCode, Json<HealthResult>) {
    probe(&state.liveness).await
}

async fn probe(check: &Arc<HealthCheck>) -> (StatusCode, Json<HealthResult>) {
    let result = check.handle().await;
    let code = if result.status.is_up() {
        StatusCode::OK
    } else {
        tracing::warn!(status = result.status.as_str(), "Health probe failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(result))
}
