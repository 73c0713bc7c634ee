//! Log server error types and their HTTP mapping.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

/// Errors returned by the log's HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Malformed JSON or an invalid pURL; the body carries the reason.
    #[error("{0}")]
    BadRequest(String),

    /// The requested checkpoint or tile does not exist.
    #[error("not found")]
    NotFound,

    /// Append, publication or proof construction failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LogError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LogError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        Response::builder()
            .status(status)
            .body(Body::from(self.to_string()))
            .expect("static response builds")
    }
}
