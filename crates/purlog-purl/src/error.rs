//! Error types for pURL parsing and validation.

/// Errors from parsing a pURL string into a [`crate::PackageUrl`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The scheme component is missing or is not `pkg`.
    #[error("purl scheme is not \"pkg\": \"{found}\"")]
    Scheme {
        /// The scheme that was found (empty if there was none).
        found: String,
    },

    /// The type or name coordinate is missing.
    #[error("purl is missing type or name")]
    MissingTypeOrName,

    /// The type coordinate contains invalid characters.
    #[error("purl type is invalid: {0}")]
    InvalidType(String),

    /// A percent-escape sequence could not be decoded.
    #[error("invalid percent-encoding in {0}")]
    InvalidEscape(&'static str),
}

/// Failure classes for [`crate::verify_purl`].
///
/// Each variant corresponds to one structural rule for log entries. The
/// display strings are part of the log's `/add` error surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The string is not a well-formed pURL at all.
    #[error(transparent)]
    Unparseable(#[from] ParseError),

    /// The pURL type does not match the log's configured type.
    #[error("pURL type must be {expected}, was {actual}")]
    WrongType {
        /// Type the log is configured for.
        expected: String,
        /// Type found in the submitted pURL.
        actual: String,
    },

    /// No version coordinate.
    #[error("pURL must contain version")]
    MissingVersion,

    /// The qualifier set is not exactly one entry.
    #[error("pURL must contain only the checksum qualifier")]
    QualifiersNotExactlyChecksum,

    /// A single qualifier is present but it is not `checksum`.
    #[error("pURL missing checksum qualifier")]
    MissingChecksum,

    /// The checksum value does not split into `<algorithm>:<digest>`.
    #[error("pURL checksum must be sha256:hex-encoded-checksum")]
    ChecksumNotColonSplit,

    /// The checksum algorithm is not `sha256`.
    #[error("pURL checksum must start with sha256")]
    AlgorithmNotSha256,

    /// The digest is not lowercase hex.
    #[error("pURL checksum must be hex-encoded")]
    ChecksumNotHex,

    /// The digest is hex but not 64 characters.
    #[error("pURL checksum must be hex-encoded SHA256 checksum")]
    ChecksumNotSha256Length,

    /// A subpath component is present.
    #[error("pURL must not contain subpath")]
    SubpathPresent,
}
