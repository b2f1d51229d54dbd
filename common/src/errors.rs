//! Application error types.
//!
//! Every failure produced by the bridge is an [`AppError`]. Handlers return
//! it directly; the [`IntoResponse`] impl turns it into the standard error
//! envelope so callers always receive a descriptive message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Error taxonomy for the bridge.
///
/// Messages must never contain passwords, api keys or session tokens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    /// No usable target could be built from configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend rejected the target's credentials, or the target is not
    /// registered.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The backend answered with a non-success status.
    #[error("request failed{}: {message}", http_status_suffix(.status))]
    RequestFailed {
        /// HTTP status, when the backend answered at all.
        status: Option<u16>,
        /// Backend message, or a generic description.
        message: String,
    },

    /// The remote call exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// Tool arguments failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for client handling.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::RequestFailed { .. } => "REQUEST_FAILED",
            AppError::Timeout => "REQUEST_TIMEOUT",
            AppError::Network(_) => "NETWORK_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used when the error is rendered by a REST route.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::RequestFailed { .. } | AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Validation(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_message_includes_status() {
        let err = AppError::RequestFailed {
            status: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "request failed (HTTP 500): boom");
    }

    #[test]
    fn test_request_failed_message_without_status() {
        let err = AppError::RequestFailed {
            status: None,
            message: "no answer".into(),
        };
        assert_eq!(err.to_string(), "request failed: no answer");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            AppError::Authentication("bad".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Validation("x".into()).code(), "VALIDATION_ERROR");
    }
}
