//! The checkpoint witness server.
//!
//! A witness maintains, per log origin, the latest `(size, hash)` pair it
//! has proven consistent with its previous state, and co-signs checkpoints
//! that extend that state. Its single endpoint is
//! `POST /{submission-prefix}/add-checkpoint`, where the prefix is the hex
//! SHA-256 of the witness's raw public key.
//!
//! The state transition is guarded by a compare-and-swap on the per-origin
//! row: the UPDATE only applies where the stored size still equals the
//! submitted `old` size, so concurrent submissions can never roll the
//! witness backwards.

mod error;
mod rebind;
mod store;


use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::Response;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_merkle::{Hash, verify_consistency};
use purlog_note::{Ed25519Signer, Ed25519Verifier, Note, parse_checkpoint, submission_prefix};
use tracing::{info, warn};

pub use error::WitnessError;
pub use rebind::rebind;
pub use store::{Dialect, LogRecord, StoreError, WitnessDb};

/// Shared state for the `add-checkpoint` handler.
#[derive(Clone)]
struct AppState {
    db: WitnessDb,
    signer: Arc<Ed25519Signer>,
    prefix: Arc<String>,
}

/// The witness HTTP server.
pub struct WitnessServer {
    router: Router,
}

impl WitnessServer {
    /// Create a server co-signing with `signer` against the records in `db`.
    pub fn new(db: WitnessDb, signer: Ed25519Signer) -> Self {
        let prefix = submission_prefix(&signer.verifier());
        let state = AppState {
            db,
            signer: Arc::new(signer),
            prefix: Arc::new(prefix),
        };
        let router = Router::new()
            .route("/{prefix}/add-checkpoint", post(add_checkpoint))
            .with_state(state);
        Self { router }
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "witness server listening");
        axum::serve(listener, self.router).await
    }

    /// Serve with graceful shutdown triggered by the given future.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "witness server listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// `POST /{prefix}/add-checkpoint`.
///
/// Body framing: an `old <size>` line, zero or more base64 consistency
/// proof lines, a blank line, then the signed checkpoint. On success the
/// response body is only the witness's signature line.
async fn add_checkpoint(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
    body: Bytes,
) -> Result<Response<Body>, WitnessError> {
    if prefix != *state.prefix {
        return Err(WitnessError::UnknownPrefix);
    }

    // Split the consistency proof block from the signed checkpoint.
    let split = find_blank_line(&body).ok_or_else(|| {
        WitnessError::BadRequest("missing blank line between proof and checkpoint".to_string())
    })?;
    let (proof_block, signed_note) = (&body[..split], &body[split + 2..]);
    let proof_text = std::str::from_utf8(proof_block)
        .map_err(|_| WitnessError::BadRequest("proof block is not UTF-8".to_string()))?;

    let mut lines = proof_text.lines();
    let old_line = lines
        .next()
        .ok_or_else(|| WitnessError::BadRequest("empty proof block".to_string()))?;
    let old = match old_line.split(' ').collect::<Vec<_>>()[..] {
        ["old", size] => size
            .parse::<u64>()
            .map_err(|_| WitnessError::BadRequest(format!("bad old size {size:?}")))?,
        _ => {
            return Err(WitnessError::BadRequest(format!(
                "expected \"old <size>\", got {old_line:?}"
            )));
        }
    };
    let mut proof_raw = Vec::new();
    for line in lines {
        let hash = BASE64
            .decode(line)
            .map_err(|_| WitnessError::BadRequest(format!("bad proof base64 {line:?}")))?;
        proof_raw.push(hash);
    }

    // The checkpoint's first line names the origin we look up.
    let origin = std::str::from_utf8(signed_note)
        .ok()
        .and_then(|s| s.lines().next())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| WitnessError::BadRequest("checkpoint missing origin line".to_string()))?
        .to_string();

    let record = state
        .db
        .lookup(&origin)
        .await
        .map_err(|e| WitnessError::Internal(e.to_string()))?
        .ok_or_else(|| {
            warn!(origin, "checkpoint for unregistered origin");
            WitnessError::UnknownOrigin(origin.clone())
        })?;

    let stored_hash: Hash = BASE64
        .decode(&record.tree_hash)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| WitnessError::Internal("stored tree hash is corrupt".to_string()))?;
    let verifier = Ed25519Verifier::from_vkey(&record.public_key)
        .map_err(|e| WitnessError::Internal(format!("stored public key is corrupt: {e}")))?;

    // Verify the log's signature under the registered key.
    let parsed = parse_checkpoint(signed_note, verifier.name(), &verifier)
        .map_err(|e| WitnessError::Forbidden(e.to_string()))?;
    let new = &parsed.checkpoint;

    if old > new.size {
        return Err(WitnessError::BadRequest(format!(
            "old size {old} greater than checkpoint size {}",
            new.size
        )));
    }
    if old != record.tree_size {
        // The submitter's view of our state is stale (or it sent 0 for
        // "unknown"); report the real size so it can renegotiate.
        return Err(WitnessError::SizeConflict {
            stored: record.tree_size,
        });
    }
    if old == new.size && stored_hash != new.hash {
        warn!(origin, size = old, "same-size checkpoint with diverging root");
        return Err(WitnessError::HashConflict(old));
    }

    let proof: Vec<Hash> = proof_raw
        .into_iter()
        .map(|h| {
            h.try_into()
                .map_err(|_| WitnessError::BadProof("proof hash is not 32 bytes".to_string()))
        })
        .collect::<Result<_, _>>()?;
    verify_consistency(old, new.size, &proof, &stored_hash, &new.hash)
        .map_err(|e| WitnessError::BadProof(e.to_string()))?;

    // Co-sign in memory; no lock is held across this.
    let mut cosigned = parsed.note;
    cosigned.add_signature(&state.signer);

    // Identical to the stored state: return a fresh cosignature without
    // touching the row. Some backends report zero affected rows for an
    // UPDATE to identical values, which would misread as a lost race.
    if old == new.size {
        return Ok(cosignature_response(&cosigned));
    }

    let advanced = state
        .db
        .cas_update(&origin, old, new.size, &BASE64.encode(new.hash))
        .await
        .map_err(|e| WitnessError::Internal(e.to_string()))?;
    if !advanced {
        // A concurrent submission won; report its size.
        let stored = state
            .db
            .tree_size(&origin)
            .await
            .map_err(|e| WitnessError::Internal(e.to_string()))?
            .ok_or_else(|| WitnessError::Internal("origin row disappeared".to_string()))?;
        return Err(WitnessError::SizeConflict { stored });
    }

    info!(origin, from = old, to = new.size, "witnessed checkpoint");
    Ok(cosignature_response(&cosigned))
}

/// Index of the first `\n\n` in `body`.
fn find_blank_line(body: &[u8]) -> Option<usize> {
    body.windows(2).position(|w| w == b"\n\n")
}

/// Success body: every signature line except the first (the log's own).
fn cosignature_response(cosigned: &Note) -> Response<Body> {
    let body: String = cosigned
        .signatures
        .iter()
        .skip(1)
        .map(|s| s.to_line())
        .collect();
    Response::builder()
        .status(200)
        .body(Body::from(body))
        .expect("static response builds")
}
