//! Monitor error types.

use purlog_merkle::ProofError;
use purlog_note::NoteError;
use purlog_tiles::TileError;

/// Errors aborting a monitor round. None of these advance persisted state.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    State(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkpoint failed to parse or verify.
    #[error(transparent)]
    Note(#[from] NoteError),

    /// Fetching tiles or bundles failed.
    #[error(transparent)]
    Tile(#[from] TileError),

    /// The log is not consistent with previously verified state. This is
    /// detected log misbehavior.
    #[error("consistency verification failed: {0}")]
    Proof(#[from] ProofError),

    /// A log entry is not a well-formed pURL. This is detected log
    /// misbehavior: the log must only accept validated entries.
    #[error("error parsing pURL {purl:?}: {reason}")]
    BadEntry {
        /// The raw entry.
        purl: String,
        /// Why it failed.
        reason: String,
    },

    /// Two entries bind the same package identity to different digests.
    #[error("ALERT: mismatched checksum for purl {identity}, got {existing}, expected {found}")]
    ChecksumMismatch {
        /// The identity key (pURL without checksum).
        identity: String,
        /// The digest recorded for this identity.
        existing: String,
        /// The conflicting digest just observed.
        found: String,
    },
}
