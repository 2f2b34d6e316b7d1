// In crates/web-server/src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Ledger(#[from] execution::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Failed to bind server address: {0}")]
    ServerBindError(#[source] std::io::Error),

    #[error("Server error: {0}")]
    ServeError(#[source] std::io::Error),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Ledger(e) => match e {
                execution::Error::Validation(_) => StatusCode::BAD_REQUEST,
                execution::Error::Forbidden { .. } => StatusCode::FORBIDDEN,
                execution::Error::NotFound { .. } => StatusCode::NOT_FOUND,
                execution::Error::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                execution::Error::Quote(_) => StatusCode::BAD_GATEWAY,
            },
            Error::ServerBindError(_) | Error::ServeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed.");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected.");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
