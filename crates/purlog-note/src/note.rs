//! The signed-note envelope.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::NoteError;
use crate::keys::{Ed25519Signer, Ed25519Verifier};

/// Signature-line marker: an em dash followed by a space.
const SIG_PREFIX: &str = "\u{2014} ";

/// One signature line of a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Signer name from the line.
    pub name: String,
    /// First four bytes of the signer's key hash.
    pub key_hash: [u8; 4],
    /// Raw signature bytes (64 for Ed25519).
    pub signature: Vec<u8>,
}

impl Signature {
    /// Render the signature line, including the trailing newline.
    pub fn to_line(&self) -> String {
        let mut blob = Vec::with_capacity(4 + self.signature.len());
        blob.extend_from_slice(&self.key_hash);
        blob.extend_from_slice(&self.signature);
        format!("{SIG_PREFIX}{} {}\n", self.name, BASE64.encode(blob))
    }
}

/// A parsed note: signed text plus its signature lines.
///
/// The text always ends with a newline and is exactly the bytes the
/// signatures cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// The signed text, trailing newline included.
    pub text: String,
    /// Signature lines in order of appearance.
    pub signatures: Vec<Signature>,
}

impl Note {
    /// Wrap unsigned text. The text must end with a newline and contain no
    /// blank lines (a blank line would be read back as the signature split).
    pub fn new(text: &str) -> Result<Self, NoteError> {
        if !text.ends_with('\n') {
            return Err(NoteError::BadFormat(
                "note text must end with a newline".to_string(),
            ));
        }
        if text.contains("\n\n") {
            return Err(NoteError::BadFormat(
                "note text must not contain blank lines".to_string(),
            ));
        }
        Ok(Self {
            text: text.to_string(),
            signatures: Vec::new(),
        })
    }

    /// Parse a serialized note (`text || "\n" || sig lines`).
    pub fn parse(bytes: &[u8]) -> Result<Self, NoteError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| NoteError::BadFormat("note is not UTF-8".to_string()))?;
        let split = s
            .rfind("\n\n")
            .ok_or_else(|| NoteError::BadFormat("missing signature separator".to_string()))?;
        let (text, sig_block) = (&s[..split + 1], &s[split + 2..]);
        if text.len() < 2 {
            return Err(NoteError::BadFormat("empty note text".to_string()));
        }
        if sig_block.is_empty() || !sig_block.ends_with('\n') {
            return Err(NoteError::BadFormat(
                "signature block must be newline-terminated lines".to_string(),
            ));
        }

        let mut signatures = Vec::new();
        for line in sig_block.lines() {
            let rest = line.strip_prefix(SIG_PREFIX).ok_or_else(|| {
                NoteError::BadFormat(format!("malformed signature line {line:?}"))
            })?;
            let (name, b64) = rest
                .split_once(' ')
                .ok_or_else(|| NoteError::BadFormat(format!("malformed signature line {line:?}")))?;
            let blob = BASE64
                .decode(b64)
                .map_err(|_| NoteError::BadFormat(format!("bad signature base64 in {line:?}")))?;
            if blob.len() < 5 {
                return Err(NoteError::BadFormat(format!(
                    "signature too short in {line:?}"
                )));
            }
            signatures.push(Signature {
                name: name.to_string(),
                key_hash: blob[..4].try_into().expect("length checked"),
                signature: blob[4..].to_vec(),
            });
        }
        if signatures.is_empty() {
            return Err(NoteError::BadFormat("note has no signatures".to_string()));
        }
        Ok(Self {
            text: text.to_string(),
            signatures,
        })
    }

    /// Serialize: text, blank line, signature lines.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.text.len() + 1 + self.signatures.len() * 100);
        out.push_str(&self.text);
        out.push('\n');
        for sig in &self.signatures {
            out.push_str(&sig.to_line());
        }
        out.into_bytes()
    }

    /// Sign the text with `signer` and append the signature line, keeping
    /// all existing signatures.
    pub fn add_signature(&mut self, signer: &Ed25519Signer) {
        let sig = signer.sign(self.text.as_bytes());
        self.signatures.push(Signature {
            name: signer.name().to_string(),
            key_hash: signer.key_hash(),
            signature: sig.to_vec(),
        });
    }

    /// Find and verify a signature by `verifier` (matching name and key
    /// hash). Returns the matching signature on success.
    pub fn verify(&self, verifier: &Ed25519Verifier) -> Result<&Signature, NoteError> {
        for sig in &self.signatures {
            if sig.name == verifier.name()
                && sig.key_hash == verifier.key_hash()
                && verifier.verify(self.text.as_bytes(), &sig.signature)
            {
                return Ok(sig);
            }
        }
        Err(NoteError::BadSignature {
            name: verifier.name().to_string(),
        })
    }

    /// Signature lines other than those matching `verifier`'s name and key
    /// hash, rendered for transport.
    pub fn other_signatures(&self, verifier: &Ed25519Verifier) -> Vec<String> {
        self.signatures
            .iter()
            .filter(|s| s.name != verifier.name() || s.key_hash != verifier.key_hash())
            .map(Signature::to_line)
            .collect()
    }
}
