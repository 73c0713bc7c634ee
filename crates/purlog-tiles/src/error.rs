//! Error type for tile storage and proof construction.

use purlog_merkle::ProofError;
use purlog_note::NoteError;

/// Errors from the tiled store, readers and proof construction.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// A tile, bundle or checkpoint was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A fetched tile or bundle is malformed.
    #[error("malformed tile data: {0}")]
    BadTile(String),

    /// An HTTP or transport failure from a remote reader.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A request outside the current tree size.
    #[error("range [{from}, {to}) outside tree of size {size}")]
    OutOfRange {
        /// First leaf requested.
        from: u64,
        /// One past the last leaf requested.
        to: u64,
        /// Current tree size.
        size: u64,
    },

    /// An entry exceeds the bundle length-prefix limit.
    #[error("entry of {0} bytes exceeds the 65535-byte bundle limit")]
    EntryTooLarge(usize),

    /// Checkpoint signing or parsing failed.
    #[error(transparent)]
    Note(#[from] NoteError),

    /// Self-check of a constructed proof failed.
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// The witness refused or failed to cosign a checkpoint.
    #[error("witness cosigning failed: {0}")]
    Witness(String),

    /// The appender has shut down.
    #[error("appender is closed")]
    Closed,
}
