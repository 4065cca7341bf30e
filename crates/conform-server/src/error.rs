use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conform_core::ConformError;
use serde_json::json;
use tracing::error;

/// An error answered as `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid or missing API key")
    }

    pub fn not_configured() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIGURATION_ERROR",
            "API key is not configured",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    }
}

impl From<ConformError> for ApiError {
    fn from(err: ConformError) -> Self {
        match err {
            ConformError::Validation(message) => Self::invalid_request(message),
            ConformError::NotReady(_) => Self::invalid_request("Check has not completed yet"),
            ConformError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Check not found")
            }
            ConformError::Config(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                "Service is misconfigured",
            ),
            other => {
                error!(code = other.code(), error = %other, "request failed");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}
