//! Remote tile reader over a log's HTTP surface.

use async_trait::async_trait;
use purlog_tiles::{
    LogReader, TileError, TileReader, checkpoint_path, entry_bundle_path, tile_path,
};
use tracing::debug;

use crate::error::ClientError;

/// Fetches checkpoints, tiles and entry bundles from a log URL.
#[derive(Debug, Clone)]
pub struct HttpLogReader {
    client: reqwest::Client,
    base: String,
}

impl HttpLogReader {
    /// Create a reader for the log at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::Url(format!(
                "log URL must be http(s), got {base_url:?}"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, rel: &str) -> Result<Vec<u8>, TileError> {
        let url = format!("{}/{rel}", self.base);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TileError::Fetch(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TileError::NotFound(rel.to_string()));
        }
        if !status.is_success() {
            return Err(TileError::Fetch(format!("GET {url}: status {status}")));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TileError::Fetch(format!("GET {url}: {e}")))?;
        debug!(url, bytes = bytes.len(), "fetched log object");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TileReader for HttpLogReader {
    async fn read_tile(&self, level: u32, index: u64, width: u16) -> Result<Vec<u8>, TileError> {
        self.get(&tile_path(level, index, width)).await
    }
}

#[async_trait]
impl LogReader for HttpLogReader {
    async fn read_checkpoint(&self) -> Result<Vec<u8>, TileError> {
        self.get(checkpoint_path()).await
    }

    async fn read_entry_bundle(&self, index: u64, width: u16) -> Result<Vec<u8>, TileError> {
        self.get(&entry_bundle_path(index, width)).await
    }
}
