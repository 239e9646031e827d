//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use engine::EngineError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller did not identify a buyer.
    #[error("{0}")]
    Unauthorized(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Engine error.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(err) => engine_error_status(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientStock { .. }
        | EngineError::InvalidTransition { .. }
        | EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Persistence(_) if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
