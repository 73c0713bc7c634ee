//! Log API request handlers.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::Response;
use axum::response::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_merkle::{hash_leaf, verify_inclusion};
use purlog_note::parse_checkpoint;
use purlog_purl::verify_purl;
use purlog_tiles::ProofBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;
use crate::error::LogError;

/// Request body for `POST /add`.
#[derive(Deserialize)]
pub(crate) struct AddRequest {
    /// The pURL entry, e.g.
    /// `pkg:pypi/name@1.2.3?checksum=sha256:<64-hex>`.
    pub purl: String,
}

/// Response body for `POST /add`. Byte fields are base64 strings, the way
/// Go's `encoding/json` renders `[]byte`.
#[derive(Serialize)]
pub(crate) struct AddResponse {
    pub index: u64,
    pub checkpoint: String,
    #[serde(rename = "inclusionProof")]
    pub inclusion_proof: Vec<String>,
}

/// `POST /add`: validate the pURL, append it, wait for a checkpoint
/// covering it, and return a self-verified inclusion proof.
pub(crate) async fn add_entry(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AddResponse>, LogError> {
    let request: AddRequest =
        serde_json::from_slice(&body).map_err(|e| LogError::BadRequest(e.to_string()))?;
    verify_purl(&request.purl, &state.purl_type).map_err(|e| {
        warn!(purl = %request.purl, error = %e, "rejected entry");
        LogError::BadRequest(e.to_string())
    })?;

    let entry = request.purl.clone().into_bytes();
    let index = state
        .appender
        .add(entry)
        .await
        .map_err(|e| LogError::Internal(e.to_string()))?;
    let published = state
        .appender
        .await_publication(index)
        .await
        .map_err(|e| LogError::Internal(e.to_string()))?;

    let parsed = parse_checkpoint(&published.bytes, &state.origin, &state.verifier)
        .map_err(|e| LogError::Internal(e.to_string()))?;
    let checkpoint = parsed.checkpoint;

    let mut builder = ProofBuilder::new(&state.storage, checkpoint.size);
    let proof = builder
        .inclusion_proof(index)
        .await
        .map_err(|e| LogError::Internal(e.to_string()))?;

    // Never hand out a proof we have not checked ourselves.
    let leaf = hash_leaf(request.purl.as_bytes());
    verify_inclusion(&leaf, index, checkpoint.size, &proof, &checkpoint.hash)
        .map_err(|e| LogError::Internal(e.to_string()))?;

    info!(index, size = checkpoint.size, purl = %request.purl, "entry added");
    Ok(Json(AddResponse {
        index,
        checkpoint: BASE64.encode(&published.bytes),
        inclusion_proof: proof.iter().map(|h| BASE64.encode(h)).collect(),
    }))
}

/// `GET /checkpoint`: the latest signed checkpoint, uncacheable.
pub(crate) async fn get_checkpoint(
    State(state): State<AppState>,
) -> Result<Response<Body>, LogError> {
    let bytes = read_storage_file(&state, "checkpoint").await?;
    Ok(Response::builder()
        .status(200)
        .header("Cache-Control", "no-cache")
        .body(Body::from(bytes))
        .expect("static response builds"))
}

/// `GET /tile/{*path}`: byte-exact tile and entry-bundle proxy. Tiles are
/// immutable once written, so they get a year-long cache lifetime.
pub(crate) async fn get_tile(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response<Body>, LogError> {
    let bytes = read_storage_file(&state, &format!("tile/{path}")).await?;
    Ok(Response::builder()
        .status(200)
        .header("Cache-Control", "max-age=31536000, immutable")
        .body(Body::from(bytes))
        .expect("static response builds"))
}

/// Read a file from the store's on-disk layout, refusing path traversal.
async fn read_storage_file(state: &AppState, rel: &str) -> Result<Vec<u8>, LogError> {
    if rel.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(LogError::NotFound);
    }
    match tokio::fs::read(state.storage.dir().join(rel)).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LogError::NotFound),
        Err(e) => Err(LogError::Internal(e.to_string())),
    }
}
