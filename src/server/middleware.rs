use std::time::Instant;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{MatchedPath, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

/// Largest body buffered for logging. Larger requests are rejected.
const MAX_LOGGED_BODY: usize = 64 * 1024;

/// Log method, URI, status and bodies of every request except probes and
/// metrics scrapes.
pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/metrics" || path.starts_with("/health/") {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();

    let (parts, body) = req.into_parts();
    let request_body = match buffer(body, &parts.headers).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    let logged_request = describe_body(&request_body);
    let req = Request::from_parts(parts, Body::from(request_body));

    let response = next.run(req).await;

    let status = response.status();
    if exceeds_limit(response.headers()) {
        tracing::info!(
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            request = %logged_request,
            "HTTP request"
        );
        return response;
    }

    let (parts, body) = response.into_parts();
    let response_body = match buffer(body, &parts.headers).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    tracing::info!(
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        request = %logged_request,
        response = %describe_body(&response_body),
        "HTTP request"
    );

    Response::from_parts(parts, Body::from(response_body))
}

/// Record request count and latency per matched route.
pub async fn http_metrics_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    state.http_metrics.record(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

fn exceeds_limit(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len > MAX_LOGGED_BODY)
}

async fn buffer(body: Body, headers: &HeaderMap) -> Result<Bytes, Response> {
    if exceeds_limit(headers) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE.into_response());
    }

    to_bytes(body, MAX_LOGGED_BODY).await.map_err(|e| {
        tracing::warn!(error = %e, "Failed to buffer body");
        StatusCode::PAYLOAD_TOO_LARGE.into_response()
    })
}

/// JSON bodies are logged compacted, anything else as text.
fn describe_body(bytes: &Bytes) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => value.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
