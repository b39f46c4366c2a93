//! Error handling for the Transfer Manager
//!
//! Every failure leaves the service as `{ok:false, error, detail, ts}` where
//! `error` is a stable code string clients switch on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use shared::{QtyError, TransitionError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Request guard errors
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("CSRF token invalid")]
    CsrfInvalid,

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    // Client input errors
    #[error("Bad request: {code}")]
    BadRequest { code: String, detail: Option<Value> },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] TransitionError),

    #[error("Quantity rejected: {0}")]
    CapExceeded(#[from] QtyError),

    #[error("Lightspeed sync is disabled")]
    SyncDisabled { flag_file: String },

    // Upstream errors
    #[error("Lightspeed error {code} (HTTP {status})")]
    Upstream {
        code: String,
        status: u16,
        message: String,
        body: Value,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(code: &str) -> Self {
        AppError::BadRequest {
            code: code.to_string(),
            detail: None,
        }
    }

    pub fn bad_request_with(code: &str, detail: impl Into<Value>) -> Self {
        AppError::BadRequest {
            code: code.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn upstream(code: &str, status: u16, message: impl Into<String>, body: Value) -> Self {
        AppError::Upstream {
            code: code.to_string(),
            status,
            message: message.into(),
            body,
        }
    }

    /// Stable code string placed in the `error` field
    pub fn code(&self) -> String {
        match self {
            AppError::Unauthorized(_) => "AUTH_REQUIRED".to_string(),
            AppError::CsrfInvalid => "CSRF_INVALID".to_string(),
            AppError::MethodNotAllowed(_) => "METHOD".to_string(),
            AppError::UnknownAction(_) => "UNKNOWN_ACTION".to_string(),
            AppError::BadRequest { code, .. } => code.clone(),
            AppError::NotFound(_) => "NOT_FOUND".to_string(),
            AppError::InvalidStateTransition(err) => err.code.to_string(),
            AppError::CapExceeded(_) => "CAP_EXCEEDED".to_string(),
            AppError::SyncDisabled { .. } => "SYNC_DISABLED".to_string(),
            AppError::Upstream { code, .. } => code.clone(),
            AppError::Configuration(_) => "CONFIGURATION_ERROR".to_string(),
            AppError::DatabaseError(_) => "DATABASE_ERROR".to_string(),
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::CsrfInvalid => {
                StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN)
            }
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::UnknownAction(_)
            | AppError::BadRequest { .. }
            | AppError::InvalidStateTransition(_)
            | AppError::CapExceeded(_)
            | AppError::SyncDisabled { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            AppError::Unauthorized(msg) | AppError::MethodNotAllowed(msg) => {
                Some(Value::String(msg.clone()))
            }
            AppError::UnknownAction(action) => Some(Value::String(action.clone())),
            AppError::BadRequest { detail, .. } => detail.clone(),
            AppError::NotFound(resource) => Some(Value::String(resource.clone())),
            AppError::InvalidStateTransition(err) => Some(json!({
                "from": err.from.as_str(),
                "message": err.to_string(),
            })),
            AppError::CapExceeded(err) => Some(Value::String(err.to_string())),
            AppError::SyncDisabled { flag_file } => Some(json!({
                "message": "Lightspeed sync is disabled",
                "flag_file": flag_file,
                "action": "Use toggle_sync to enable or set the flag file to \"1\"",
            })),
            AppError::Upstream {
                status,
                message,
                body,
                ..
            } => Some(json!({
                "message": message,
                "status": status,
                "response": body,
            })),
            AppError::Configuration(msg) | AppError::Internal(msg) => {
                Some(Value::String(msg.clone()))
            }
            AppError::CsrfInvalid | AppError::DatabaseError(_) | AppError::InternalError(_) => {
                None
            }
        }
    }
}

/// Error envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub detail: Option<Value>,
    pub ts: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!(code = %self.code(), "Request rejected: {}", self);
        }

        let body = ErrorResponse {
            ok: false,
            error: self.code(),
            detail: self.detail(),
            ts: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
