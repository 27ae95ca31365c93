//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use searchrel_core::{ClassifierError, GatewayError, ValidationError};

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Body could not be read as a classification payload.
    #[error("{0}")]
    BadRequest(String),

    /// Payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Classifier invocation failed.
    #[error("Classification failed: {0}")]
    Classifier(#[from] ClassifierError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Invalid(e) => ApiError::Validation(e),
            GatewayError::Classifier(e) => ApiError::Classifier(e),
        }
    }
}

impl ApiError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Validation(ValidationError::EmptyInput) => {
                (StatusCode::BAD_REQUEST, "empty_input")
            }
            ApiError::Validation(ValidationError::UnknownRegion(_)) => {
                (StatusCode::BAD_REQUEST, "unknown_region")
            }
            ApiError::Classifier(ClassifierError::Timeout(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "classifier_timeout")
            }
            ApiError::Classifier(_) => (StatusCode::INTERNAL_SERVER_ERROR, "classifier_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code, "{}", self);
        }

        let body = ErrorResponse {
            detail: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
