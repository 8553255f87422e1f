// Error responses for the HTTP surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::{ErrorKind, EsioError};

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable detail
    pub message: String,
}

/// HTTP error with a stable code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Error with an explicit status and code
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400 with code `BAD_REQUEST`
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// HTTP status sent
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Human-readable detail
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EsioError> for ApiError {
    fn from(err: EsioError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::InputValidation => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::UpstreamUnreachable => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_UNREACHABLE"),
            ErrorKind::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            ErrorKind::StateInconsistency => (StatusCode::INTERNAL_SERVER_ERROR, "STATE_INCONSISTENCY"),
            ErrorKind::RangeConflict => (StatusCode::RANGE_NOT_SATISFIABLE, "RANGE_CONFLICT"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = self.code, message = %self.message, "Request rejected");
        }

        (
            self.status,
            Json(ApiErrorBody {
                code: self.code.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}
