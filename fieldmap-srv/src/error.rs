//! Error types for fieldmap-srv

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404) - also covers cross-organization access
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or malformed identity headers (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Every upstream endpoint failed (502). Carries the last endpoint's
    /// status and truncated body for diagnostics.
    #[error("Upstream unavailable")]
    UpstreamUnavailable {
        status: Option<u16>,
        body: Option<String>,
    },

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Street-lookup upstream failures use the documented flat payload
        // so callers can distinguish "service down" from "no matches".
        if let ApiError::UpstreamUnavailable { status, body } = self {
            let mut payload = json!({"error": "Street lookup failed."});
            if let Some(status) = status {
                payload["status"] = json!(status);
            }
            if let Some(body) = body {
                payload["body"] = json!(body);
            }
            return (StatusCode::BAD_GATEWAY, Json(payload)).into_response();
        }

        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::UpstreamUnavailable { .. } => unreachable!(),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
