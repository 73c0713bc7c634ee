//! Persisted monitor state: the last verified checkpoint and the
//! identity→digest map.
//!
//! Both files are written via temp+rename, map before checkpoint. A crash
//! between the two leaves the map ahead of the checkpoint, which is safe:
//! the next round re-verifies from the older checkpoint and re-inserts the
//! same mappings.

use std::collections::BTreeMap;
use std::path::PathBuf;

use purlog_note::{Checkpoint, Ed25519Verifier, parse_checkpoint};

use crate::error::MonitorError;

const CHECKPOINT_FILE: &str = "checkpoint";
const ID_MAP_FILE: &str = "idhashmap";

/// File-backed monitor state under a storage directory.
pub struct MonitorState {
    dir: PathBuf,
}

impl MonitorState {
    /// State rooted at `dir` (created on first persist).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load and re-verify the persisted checkpoint plus the identity map.
    /// Returns `None` when no prior state exists (first run).
    pub async fn load(
        &self,
        origin: &str,
        verifier: &Ed25519Verifier,
    ) -> Result<Option<(Checkpoint, BTreeMap<String, String>)>, MonitorError> {
        let checkpoint_bytes = match tokio::fs::read(self.dir.join(CHECKPOINT_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MonitorError::Io(e)),
        };
        let checkpoint = parse_checkpoint(&checkpoint_bytes, origin, verifier)?.checkpoint;

        let map_bytes = tokio::fs::read(self.dir.join(ID_MAP_FILE))
            .await
            .map_err(|e| MonitorError::State(format!("reading identity map: {e}")))?;
        let id_map: BTreeMap<String, String> = serde_json::from_slice(&map_bytes)
            .map_err(|e| MonitorError::State(format!("decoding identity map: {e}")))?;
        Ok(Some((checkpoint, id_map)))
    }

    /// Atomically persist the new round state.
    pub async fn persist(
        &self,
        checkpoint_bytes: &[u8],
        id_map: &BTreeMap<String, String>,
    ) -> Result<(), MonitorError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let map_bytes = serde_json::to_vec(id_map)
            .map_err(|e| MonitorError::State(format!("encoding identity map: {e}")))?;
        self.write_atomic(ID_MAP_FILE, &map_bytes).await?;
        self.write_atomic(CHECKPOINT_FILE, checkpoint_bytes).await?;
        Ok(())
    }

    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), MonitorError> {
        let path = self.dir.join(name);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
