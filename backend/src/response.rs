//! Success envelope shared by every action
//!
//! Successful responses are `{ "ok": true, "data": ..., "ts": ... }`; the
//! error side lives in [`crate::error::ErrorResponse`].

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: T,
    pub ts: String,
}

/// Wrap a payload in the success envelope
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        ok: true,
        data,
        ts: chrono::Utc::now().to_rfc3339(),
    })
}
