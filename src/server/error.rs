//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::error::PlatformError;

/// Errors surfaced by the HTTP handlers, rendered as `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Platform(err) => match err {
                PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
                PlatformError::NotRunning => StatusCode::CONFLICT,
                PlatformError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PlatformError::BadRequest(_)
                | PlatformError::PortsExhausted { .. }
                | PlatformError::PullInterrupted { .. }
                | PlatformError::OperationFailed { .. } => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Platform(PlatformError::Store(e)) => {
                error!(error = %e, "Storage failure while handling request");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, StoreError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PlatformError::NotFound("Container not found".into()), StatusCode::NOT_FOUND),
            (PlatformError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                PlatformError::PortsExhausted { start: 1, end: 2 },
                StatusCode::BAD_REQUEST,
            ),
            (
                PlatformError::PullInterrupted { image: "alpine:3.18".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                PlatformError::operation("start container", EngineError::RequestFailed("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (PlatformError::NotRunning, StatusCode::CONFLICT),
            (
                PlatformError::Store(StoreError::ConnectionFailed("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(
            ApiError::Unauthorized("missing".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::from(PlatformError::NotFound("Container not found".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
