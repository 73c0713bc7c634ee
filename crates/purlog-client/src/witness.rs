//! The log-side witness client.
//!
//! Ships freshly signed checkpoints to a witness's `add-checkpoint`
//! endpoint. The submission carries the size the witness last verified and
//! a consistency proof from that size; a 409 response renegotiates the
//! size and the submission is retried with a fresh proof.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_merkle::Hash;
use purlog_note::{Ed25519Verifier, Note, submission_prefix};
use purlog_tiles::{CheckpointWitness, ProofBuilder, TileError, TileReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Outcome of one submission attempt.
enum Submission {
    /// 200: the response body is the witness signature line(s).
    Cosigned(Vec<u8>),
    /// 409 with a size body: the witness is at this size.
    Conflict(u64),
}

/// Client for a single witness, tracking the size it last verified.
pub struct WitnessClient {
    client: reqwest::Client,
    url: String,
    verifier: Ed25519Verifier,
    /// Size the witness last verified, renegotiated via 409 responses.
    /// Starts at 0, meaning "unknown".
    last_size: Mutex<u64>,
}

impl WitnessClient {
    /// Create a client for the witness at `witness_url` whose verifier key
    /// is `witness_vkey`. The submission prefix is derived from the key.
    pub fn new(witness_url: &str, witness_vkey: &str) -> Result<Self, ClientError> {
        let verifier = Ed25519Verifier::from_vkey(witness_vkey)?;
        if !witness_url.starts_with("http://") && !witness_url.starts_with("https://") {
            return Err(ClientError::Url(format!(
                "witness URL must be http(s), got {witness_url:?}"
            )));
        }
        let url = format!(
            "{}/{}/add-checkpoint",
            witness_url.trim_end_matches('/'),
            submission_prefix(&verifier)
        );
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            verifier,
            last_size: Mutex::new(0),
        })
    }

    async fn submit(&self, body: Vec<u8>) -> Result<Submission, ClientError> {
        let resp = self
            .client
            .post(&self.url)
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Http(format!("POST {}: {e}", self.url)))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::Http(format!("POST {}: {e}", self.url)))?;

        match status.as_u16() {
            200 => Ok(Submission::Cosigned(bytes.to_vec())),
            409 => {
                let body = String::from_utf8_lossy(&bytes);
                match body.trim().parse::<u64>() {
                    Ok(size) => Ok(Submission::Conflict(size)),
                    // A bodiless 409 is a hash mismatch at equal size; the
                    // witness and log disagree about history.
                    Err(_) => Err(ClientError::WitnessRejected {
                        status: 409,
                        body: body.into_owned(),
                    }),
                }
            }
            s => Err(ClientError::WitnessRejected {
                status: s,
                body: String::from_utf8_lossy(&bytes[..bytes.len().min(256)]).into_owned(),
            }),
        }
    }
}

/// Frame a witness submission: the `old` size line, base64 proof hashes,
/// a blank line, then the signed checkpoint.
fn encode_submission(old: u64, proof: &[Hash], checkpoint: &[u8]) -> Vec<u8> {
    let mut body = format!("old {old}\n");
    for h in proof {
        body.push_str(&BASE64.encode(h));
        body.push('\n');
    }
    body.push('\n');
    let mut bytes = body.into_bytes();
    bytes.extend_from_slice(checkpoint);
    bytes
}

#[async_trait]
impl CheckpointWitness for WitnessClient {
    async fn cosign(
        &self,
        signed_checkpoint: &[u8],
        size: u64,
        reader: &dyn TileReader,
    ) -> Result<String, TileError> {
        let mut old = *self.last_size.lock().await;

        // One renegotiation round: if the first attempt conflicts, retry
        // once with the size the witness reported.
        for _ in 0..2 {
            if old > size {
                return Err(TileError::Witness(format!(
                    "witness has verified size {old}, ahead of checkpoint size {size}"
                )));
            }
            let proof = ProofBuilder::new(reader, size)
                .consistency_proof(old, size)
                .await?;
            let body = encode_submission(old, &proof, signed_checkpoint);
            match self.submit(body).await {
                Ok(Submission::Cosigned(cosig)) => {
                    let line = String::from_utf8(cosig)
                        .map_err(|_| TileError::Witness("cosignature is not UTF-8".to_string()))?;
                    verify_cosignature(signed_checkpoint, &line, &self.verifier)?;
                    *self.last_size.lock().await = size;
                    info!(size, witness = self.verifier.name(), "checkpoint cosigned");
                    return Ok(line);
                }
                Ok(Submission::Conflict(current)) => {
                    debug!(
                        ours = old,
                        theirs = current,
                        "witness size conflict, renegotiating"
                    );
                    old = current;
                }
                Err(e) => {
                    warn!(error = %e, "witness submission failed");
                    return Err(TileError::Witness(e.to_string()));
                }
            }
        }
        Err(TileError::Witness(
            "witness size renegotiation did not converge".to_string(),
        ))
    }
}

/// Check that `line` is a valid cosignature over the checkpoint text by
/// the expected witness key.
fn verify_cosignature(
    signed_checkpoint: &[u8],
    line: &str,
    verifier: &Ed25519Verifier,
) -> Result<(), TileError> {
    let mut combined = signed_checkpoint.to_vec();
    combined.extend_from_slice(line.as_bytes());
    let note = Note::parse(&combined)
        .map_err(|e| TileError::Witness(format!("malformed cosigned note: {e}")))?;
    note.verify(verifier)
        .map_err(|e| TileError::Witness(format!("cosignature did not verify: {e}")))?;
    Ok(())
}
