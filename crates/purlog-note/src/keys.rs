//! Named Ed25519 signers and verifiers in the sumdb note key encoding.
//!
//! A verifier key is `<name>+<hash8>+<base64(0x01 || pubkey)>`; a signer key
//! is `PRIVATE+KEY+<name>+<hash8>+<base64(0x01 || seed)>`. `hash8` is the
//! big-endian hex of the first four bytes of
//! `SHA256(name || "\n" || 0x01 || pubkey)`, and the same value appears in
//! both encodings so a signer and its verifier can be matched by eye.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::NoteError;

/// Algorithm byte for Ed25519 in note key encodings.
const ALG_ED25519: u8 = 0x01;

/// A named Ed25519 verification key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    name: String,
    key_hash: [u8; 4],
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Build a verifier from a name and a raw verifying key.
    pub fn new(name: &str, key: VerifyingKey) -> Result<Self, NoteError> {
        check_name(name)?;
        Ok(Self {
            name: name.to_string(),
            key_hash: key_hash(name, key.as_bytes()),
            key,
        })
    }

    /// Parse a verifier key string (`name+hash8+base64`).
    pub fn from_vkey(vkey: &str) -> Result<Self, NoteError> {
        let mut parts = vkey.trim().splitn(3, '+');
        let (name, hash_hex, key_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(h), Some(k)) => (n, h, k),
            _ => return Err(NoteError::BadVerifierKey),
        };
        check_name(name)?;

        let blob = BASE64
            .decode(key_b64)
            .map_err(|_| NoteError::BadVerifierKey)?;
        if blob.len() != 33 || blob[0] != ALG_ED25519 {
            return Err(NoteError::BadVerifierKey);
        }
        let raw: [u8; 32] = blob[1..].try_into().expect("length checked");
        let key = VerifyingKey::from_bytes(&raw).map_err(|_| NoteError::BadVerifierKey)?;

        let computed = key_hash(name, &raw);
        if hash_hex != hex::encode(computed) {
            return Err(NoteError::BadVerifierKey);
        }
        Ok(Self {
            name: name.to_string(),
            key_hash: computed,
            key,
        })
    }

    /// The signer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 4-byte key hash binding signature lines to this key.
    pub fn key_hash(&self) -> [u8; 4] {
        self.key_hash
    }

    /// The raw 32-byte public key.
    pub fn raw_key(&self) -> [u8; 32] {
        *self.key.as_bytes()
    }

    /// Verify a signature over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let Ok(sig) = ed25519_dalek::Signature::from_slice(sig) else {
            return false;
        };
        self.key.verify(msg, &sig).is_ok()
    }

    /// The verifier key string.
    pub fn to_vkey(&self) -> String {
        let mut blob = Vec::with_capacity(33);
        blob.push(ALG_ED25519);
        blob.extend_from_slice(self.key.as_bytes());
        format!(
            "{}+{}+{}",
            self.name,
            hex::encode(self.key_hash),
            BASE64.encode(blob)
        )
    }
}

/// A named Ed25519 signing key.
pub struct Ed25519Signer {
    name: String,
    key_hash: [u8; 4],
    key: SigningKey,
}

impl Ed25519Signer {
    /// Parse a signer key string (`PRIVATE+KEY+name+hash8+base64`).
    pub fn from_skey(skey: &str) -> Result<Self, NoteError> {
        let rest = skey
            .trim()
            .strip_prefix("PRIVATE+KEY+")
            .ok_or(NoteError::BadSignerKey)?;
        let mut parts = rest.splitn(3, '+');
        let (name, hash_hex, key_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(h), Some(k)) => (n, h, k),
            _ => return Err(NoteError::BadSignerKey),
        };
        check_name(name)?;

        let blob = BASE64
            .decode(key_b64)
            .map_err(|_| NoteError::BadSignerKey)?;
        if blob.len() != 33 || blob[0] != ALG_ED25519 {
            return Err(NoteError::BadSignerKey);
        }
        let seed: [u8; 32] = blob[1..].try_into().expect("length checked");
        let key = SigningKey::from_bytes(&seed);

        // The hash in the signer key is computed over the public encoding.
        let computed = key_hash(name, key.verifying_key().as_bytes());
        if hash_hex != hex::encode(computed) {
            return Err(NoteError::BadSignerKey);
        }
        Ok(Self {
            name: name.to_string(),
            key_hash: computed,
            key,
        })
    }

    /// The signer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 4-byte key hash.
    pub fn key_hash(&self) -> [u8; 4] {
        self.key_hash
    }

    /// Sign `msg`, returning the 64-byte signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.key.sign(msg).to_bytes()
    }

    /// The matching verifier.
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier {
            name: self.name.clone(),
            key_hash: self.key_hash,
            key: self.key.verifying_key(),
        }
    }
}

/// Generate a fresh Ed25519 keypair named `origin`.
///
/// Returns `(signer_key, verifier_key)` strings.
pub fn generate_key(origin: &str) -> Result<(String, String), NoteError> {
    check_name(origin)?;

    let mut seed = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut seed);
    let key = SigningKey::from_bytes(&seed);

    let hash = key_hash(origin, key.verifying_key().as_bytes());
    let mut priv_blob = Vec::with_capacity(33);
    priv_blob.push(ALG_ED25519);
    priv_blob.extend_from_slice(&seed);
    let skey = format!(
        "PRIVATE+KEY+{origin}+{}+{}",
        hex::encode(hash),
        BASE64.encode(priv_blob)
    );

    let mut pub_blob = Vec::with_capacity(33);
    pub_blob.push(ALG_ED25519);
    pub_blob.extend_from_slice(key.verifying_key().as_bytes());
    let vkey = format!(
        "{origin}+{}+{}",
        hex::encode(hash),
        BASE64.encode(pub_blob)
    );

    Ok((skey, vkey))
}

/// The witness submission prefix: lowercase hex SHA-256 of the raw 32-byte
/// public key. Embedded in the witness URL path so submissions bind to one
/// witness identity.
pub fn submission_prefix(verifier: &Ed25519Verifier) -> String {
    hex::encode(Sha256::digest(verifier.raw_key()))
}

/// DER prefix of an Ed25519 SubjectPublicKeyInfo structure.
const SPKI_ED25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Parse a PEM `PUBLIC KEY` block or base64 DER into an Ed25519 key.
pub fn parse_spki_public_key(input: &str) -> Result<VerifyingKey, NoteError> {
    let input = input.trim();
    let der = if let Some(rest) = input.strip_prefix("-----BEGIN ") {
        let (label, body) = rest
            .split_once("-----")
            .ok_or_else(|| NoteError::BadPublicKey("unterminated PEM header".to_string()))?;
        if label != "PUBLIC KEY" {
            return Err(NoteError::BadPublicKey(format!(
                "expected PUBLIC KEY PEM block, got {label}"
            )));
        }
        let body = body
            .split("-----END")
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();
        BASE64
            .decode(body)
            .map_err(|e| NoteError::BadPublicKey(format!("invalid PEM base64: {e}")))?
    } else {
        BASE64
            .decode(input)
            .map_err(|e| NoteError::BadPublicKey(format!("invalid base64 DER: {e}")))?
    };

    if der.len() != 44 || der[..12] != SPKI_ED25519_PREFIX {
        return Err(NoteError::BadPublicKey(
            "DER is not an Ed25519 SubjectPublicKeyInfo".to_string(),
        ));
    }
    let raw: [u8; 32] = der[12..].try_into().expect("length checked");
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| NoteError::BadPublicKey(format!("invalid key bytes: {e}")))
}

/// `SHA256(name || "\n" || 0x01 || pubkey)[0..4]`.
fn key_hash(name: &str, pubkey: &[u8; 32]) -> [u8; 4] {
    let mut h = Sha256::new();
    h.update(name.as_bytes());
    h.update(b"\n");
    h.update([ALG_ED25519]);
    h.update(pubkey);
    let digest = h.finalize();
    digest[..4].try_into().expect("digest is 32 bytes")
}

fn check_name(name: &str) -> Result<(), NoteError> {
    if name.is_empty() || name.contains(['+', ' ', '\n']) {
        return Err(NoteError::BadName(name.to_string()));
    }
    Ok(())
}
