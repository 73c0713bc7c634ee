//! Error types for the note codec.

/// Errors from parsing, verifying or signing notes and keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoteError {
    /// The note or checkpoint body is structurally malformed.
    #[error("malformed note: {0}")]
    BadFormat(String),

    /// No verifiable signature by the required signer.
    #[error("note not signed by {name}")]
    BadSignature {
        /// Name of the signer whose signature was required.
        name: String,
    },

    /// The checkpoint origin line does not match the expected origin.
    #[error("checkpoint origin mismatch: expected {expected:?}, got {actual:?}")]
    OriginMismatch {
        /// Origin the caller expected.
        expected: String,
        /// Origin found on the first line.
        actual: String,
    },

    /// A verifier key string could not be decoded.
    #[error("malformed verifier key")]
    BadVerifierKey,

    /// A signer (private) key string could not be decoded.
    #[error("malformed signer key")]
    BadSignerKey,

    /// Signer names must be non-empty and free of `+`, spaces and newlines.
    #[error("invalid signer name {0:?}")]
    BadName(String),

    /// A PEM or DER public key could not be parsed as Ed25519 SPKI.
    #[error("not an Ed25519 public key: {0}")]
    BadPublicKey(String),
}
