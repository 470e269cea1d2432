//! HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert clipreel_core errors to HTTP errors
impl From<clipreel_core::Error> for AppError {
    fn from(err: clipreel_core::Error) -> Self {
        use clipreel_core::Error;

        match err {
            Error::EmptyWindow | Error::NoEvents | Error::NoClipsProduced => {
                AppError::bad_request(err.to_string())
            }
            Error::NotFound(msg) => AppError::not_found(msg),
            Error::NothingToReplay => AppError::not_found(err.to_string()),
            Error::ReplayDisallowed(_) | Error::ReplayIdsExhausted => {
                AppError::conflict(err.to_string())
            }
            Error::BackendUnavailable(_) | Error::Cancelled(_) => {
                AppError::service_unavailable(err.to_string())
            }
            Error::DeadlineExceeded(_) => AppError::new(StatusCode::GATEWAY_TIMEOUT, err.to_string()),
            Error::ProbeFailed(_) | Error::Transcoder(_) => {
                tracing::error!("Media tool error: {}", err);
                AppError::internal_server_error("Media tool failed")
            }
            Error::InvalidUrl(_) | Error::Io(_) | Error::Serialization(_) => {
                tracing::error!("Internal error: {}", err);
                AppError::internal_server_error("Internal server error")
            }
        }
    }
}
