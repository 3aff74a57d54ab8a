//! Error types for the restream server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::protocol::ErrorResponse;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Supervisor error.
    #[error(transparent)]
    Core(#[from] restream_core::Error),

    /// Malformed request that never reached the supervisor.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// HTTP status reported to API callers.
    pub fn status_code(&self) -> StatusCode {
        use restream_core::Error as Core;

        match self {
            Self::Core(Core::InvalidRequest(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(Core::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Core(Core::AlreadyExists(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_found: ServerError = restream_core::Error::NotFound("srcA".into()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let duplicate: ServerError = restream_core::Error::AlreadyExists("srcA".into()).into();
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

        let spawn: ServerError = restream_core::Error::Spawn { message: "no bash".into() }.into();
        assert_eq!(spawn.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ServerError::BadRequest("missing url".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
