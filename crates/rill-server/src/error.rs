//! Error types for the Rill server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Core engine error.
    #[error("{0}")]
    Core(#[from] rill_core::Error),

    /// Bind or socket failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid listen address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Core(rill_core::Error::CellNotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
