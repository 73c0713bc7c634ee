//! Error type for the HTTP clients.

use purlog_note::NoteError;
use purlog_tiles::TileError;

/// Errors from the log reader and witness client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A URL could not be constructed.
    #[error("invalid URL: {0}")]
    Url(String),

    /// Transport-level failure.
    #[error("http request failed: {0}")]
    Http(String),

    /// The witness refused the submission outright.
    #[error("witness rejected checkpoint: status {status}, body {body:?}")]
    WitnessRejected {
        /// HTTP status returned by the witness.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The returned cosignature did not verify.
    #[error(transparent)]
    Note(#[from] NoteError),

    /// Proof construction against the local tiles failed.
    #[error(transparent)]
    Tile(#[from] TileError),
}
