//! Attaches a `system` snapshot to every `ok: false` error body

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::AppState;

const MAX_ERROR_BODY: usize = 1024 * 1024;

pub async fn diagnostics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !state.config.error_diagnostics || !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_ERROR_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Could not buffer error body for diagnostics");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let mut payload: Value = match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) if map.get("ok") == Some(&Value::Bool(false)) => Value::Object(map),
        _ => return Response::from_parts(parts, Body::from(bytes)),
    };

    let snapshot = state.diagnostics.snapshot().await;
    payload["system"] = serde_json::to_value(snapshot).unwrap_or(Value::Null);

    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(payload.to_string()))
}
