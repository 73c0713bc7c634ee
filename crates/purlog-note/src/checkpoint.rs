//! Checkpoint bodies and signed-checkpoint parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_merkle::Hash;

use crate::error::NoteError;
use crate::keys::Ed25519Verifier;
use crate::note::Note;

/// A checkpoint: the log's statement about its current tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Logical log name (first body line).
    pub origin: String,
    /// Tree size in leaves.
    pub size: u64,
    /// RFC 6962 root hash over the first `size` leaves.
    pub hash: Hash,
}

impl Checkpoint {
    /// Render the checkpoint body: `origin\nsize\nbase64(hash)\n`.
    pub fn to_body(&self) -> String {
        format!("{}\n{}\n{}\n", self.origin, self.size, BASE64.encode(self.hash))
    }

    /// Parse a checkpoint body. Extension lines after the first three are
    /// tolerated and ignored; they remain covered by any signature because
    /// signatures are over the full text.
    pub fn from_body(text: &str) -> Result<Self, NoteError> {
        let mut lines = text.lines();
        let origin = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| NoteError::BadFormat("checkpoint missing origin line".to_string()))?;
        let size: u64 = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| NoteError::BadFormat("checkpoint missing size line".to_string()))?;
        let hash_b64 = lines
            .next()
            .ok_or_else(|| NoteError::BadFormat("checkpoint missing hash line".to_string()))?;
        let hash_bytes = BASE64
            .decode(hash_b64)
            .map_err(|_| NoteError::BadFormat("checkpoint hash is not base64".to_string()))?;
        let hash: Hash = hash_bytes
            .try_into()
            .map_err(|_| NoteError::BadFormat("checkpoint hash is not 32 bytes".to_string()))?;
        Ok(Self {
            origin: origin.to_string(),
            size,
            hash,
        })
    }
}

/// A checkpoint note that carried a valid signature by the expected log key.
#[derive(Debug, Clone)]
pub struct ParsedCheckpoint {
    /// The parsed checkpoint body.
    pub checkpoint: Checkpoint,
    /// The full note, for re-signing or splitting off cosignatures.
    pub note: Note,
}

/// Parse and verify a signed checkpoint.
///
/// Requires a signature by `verifier` over the text, and that the origin
/// line equals `origin`. Additional signatures (witness cosignatures) are
/// retained on the returned note.
pub fn parse_checkpoint(
    bytes: &[u8],
    origin: &str,
    verifier: &Ed25519Verifier,
) -> Result<ParsedCheckpoint, NoteError> {
    let note = Note::parse(bytes)?;
    note.verify(verifier)?;

    let checkpoint = Checkpoint::from_body(&note.text)?;
    if checkpoint.origin != origin {
        return Err(NoteError::OriginMismatch {
            expected: origin.to_string(),
            actual: checkpoint.origin,
        });
    }
    Ok(ParsedCheckpoint { checkpoint, note })
}
