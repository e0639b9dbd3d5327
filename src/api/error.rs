//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::GenerationError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No photos in request")]
    NoPhotos,
    #[error("Unknown quality preset: {0}")]
    UnknownPreset(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Upload too large")]
    PayloadTooLarge,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NoPhotos => (
                StatusCode::BAD_REQUEST,
                "NO_PHOTOS",
                "No photos were selected".to_string(),
            ),
            ApiError::UnknownPreset(key) => (
                StatusCode::BAD_REQUEST,
                "UNKNOWN_PRESET",
                format!("Unknown quality preset: {key}"),
            ),
            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                detail.clone(),
            ),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Upload exceeds the configured size limit".to_string(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::NoPhotos => ApiError::NoPhotos,
            GenerationError::UnknownPreset(key) => ApiError::UnknownPreset(key),
            e @ (GenerationError::InvalidColumns(_) | GenerationError::InvalidWhitespace(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            e @ (GenerationError::Packaging(_) | GenerationError::Io(_)) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}
