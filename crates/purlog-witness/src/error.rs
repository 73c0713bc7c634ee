//! Witness error types and their HTTP mapping.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

/// Errors returned by the `add-checkpoint` handler.
///
/// The status mapping is the protocol: submitters drive their retry state
/// machine off these codes, in particular the 409 size renegotiation.
#[derive(Debug, thiserror::Error)]
pub enum WitnessError {
    /// The submission body or its framing is malformed.
    #[error("malformed submission: {0}")]
    BadRequest(String),

    /// The URL prefix does not name this witness.
    #[error("unknown witness prefix")]
    UnknownPrefix,

    /// The checkpoint origin is not registered at this witness.
    #[error("origin {0} not registered")]
    UnknownOrigin(String),

    /// The checkpoint did not verify under the registered key.
    #[error("checkpoint not verifiable: {0}")]
    Forbidden(String),

    /// The submitted `old` size does not match the stored size; the body
    /// carries the stored size for renegotiation.
    #[error("old size does not match verified size {stored}")]
    SizeConflict {
        /// The size this witness has verified.
        stored: u64,
    },

    /// Same size as stored but a different root hash: the log forked.
    #[error("root hash mismatch at size {0}")]
    HashConflict(u64),

    /// The consistency proof did not verify.
    #[error("consistency proof invalid: {0}")]
    BadProof(String),

    /// Store or signing failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for WitnessError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST.into_response(),
            Self::UnknownPrefix | Self::UnknownOrigin(_) => StatusCode::NOT_FOUND.into_response(),
            Self::Forbidden(_) => StatusCode::FORBIDDEN.into_response(),
            Self::SizeConflict { stored } => Response::builder()
                .status(StatusCode::CONFLICT)
                .header("Content-Type", "text/x.tlog.size")
                .body(Body::from(stored.to_string()))
                .expect("static response builds"),
            Self::HashConflict(_) => StatusCode::CONFLICT.into_response(),
            Self::BadProof(_) => StatusCode::UNPROCESSABLE_ENTITY.into_response(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
