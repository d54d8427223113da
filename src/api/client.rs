//! Client record endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::client::{ClientResponse, CreateClientRequest, NewClient};
use crate::error::{AppError, Result};
use crate::server::AppState;

/// POST /v1/client - Store a new client
#[tracing::instrument(name = "http.create_client", skip(state, payload))]
pub async fn create_client(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let client = NewClient::try_from(request)?;

    // In-flight requests outlive shutdown; the server drains them
    state
        .clients
        .create(&CancellationToken::new(), &client)
        .await?;

    tracing::info!(client_id = %client.id, "Client created");
    Ok(StatusCode::CREATED)
}

/// GET /v1/client/{id} - Fetch a client by id
#[tracing::instrument(name = "http.get_client", skip(state))]
pub async fn get_client(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.clients.get(&CancellationToken::new(), id).await {
        Ok(client) => Json(ClientResponse::from(client)).into_response(),
        Err(e) => e.into_response(),
    }
}
