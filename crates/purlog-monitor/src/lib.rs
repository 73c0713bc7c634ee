//! The log monitor.
//!
//! Tails a log through its tile-reader surface: each round verifies the
//! latest checkpoint's signature, proves it consistent with the previously
//! verified one, parses every new entry as a pURL and enforces that each
//! package identity (the pURL minus its checksum qualifier) maps to exactly
//! one digest over the lifetime of the log.
//!
//! The monitor is a pure verifier: it never writes to the log or witness.
//! A round that detects misbehavior aborts before persisting, so the next
//! round re-verifies from the same trusted state.

mod error;
mod state;


use purlog_merkle::{empty_root, verify_consistency};
use purlog_note::{Checkpoint, Ed25519Verifier, parse_checkpoint};
use purlog_purl::PackageUrl;
use purlog_tiles::{LogReader, ProofBuilder, bundle_range, parse_entry_bundle};
use regex::Regex;
use tracing::{debug, error, info};

pub use error::MonitorError;
pub use state::MonitorState;

/// Optional per-coordinate filters; when all four are set, entries whose
/// every coordinate matches are logged as found.
#[derive(Debug, Clone)]
pub struct PurlFilters {
    /// Matches the pURL type.
    pub ty: Regex,
    /// Matches the namespace (empty string when absent).
    pub namespace: Regex,
    /// Matches the name.
    pub name: Regex,
    /// Matches the version.
    pub version: Regex,
}

impl PurlFilters {
    fn matches(&self, purl: &PackageUrl) -> bool {
        self.ty.is_match(&purl.ty)
            && self.namespace.is_match(purl.namespace.as_deref().unwrap_or(""))
            && self.name.is_match(&purl.name)
            && self.version.is_match(purl.version.as_deref().unwrap_or(""))
    }
}

/// Summary of one successful monitor round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Size the round started from.
    pub previous_size: u64,
    /// Size the round verified up to.
    pub latest_size: u64,
    /// Entries processed this round.
    pub new_entries: u64,
}

/// A monitor bound to one log.
pub struct Monitor<R: LogReader> {
    reader: R,
    verifier: Ed25519Verifier,
    state: MonitorState,
    filters: Option<PurlFilters>,
}

impl<R: LogReader> Monitor<R> {
    /// Create a monitor reading the log through `reader`, verifying with
    /// `verifier`, and persisting round state under `storage_dir`.
    pub fn new(
        reader: R,
        verifier: Ed25519Verifier,
        storage_dir: impl Into<std::path::PathBuf>,
        filters: Option<PurlFilters>,
    ) -> Self {
        Self {
            reader,
            verifier,
            state: MonitorState::new(storage_dir),
            filters,
        }
    }

    /// Run one round: fetch, verify consistency, scan new entries, and
    /// persist the advanced state. Any error aborts the round with nothing
    /// persisted.
    pub async fn run_round(&mut self) -> Result<RoundOutcome, MonitorError> {
        let origin = self.verifier.name().to_string();

        // Previous trusted state; a first run starts from the empty tree.
        let (previous, mut id_map) = match self.state.load(&origin, &self.verifier).await? {
            Some((checkpoint, map)) => (checkpoint, map),
            None => (
                Checkpoint {
                    origin: origin.clone(),
                    size: 0,
                    hash: empty_root(),
                },
                Default::default(),
            ),
        };

        let latest_bytes = self.reader.read_checkpoint().await?;
        let latest = parse_checkpoint(&latest_bytes, &origin, &self.verifier)?.checkpoint;
        debug!(previous = previous.size, latest = latest.size, "fetched checkpoint");

        // Prove append-only growth before touching any entries.
        let mut builder = ProofBuilder::new(&self.reader, latest.size);
        let proof = builder
            .consistency_proof(previous.size, latest.size)
            .await?;
        verify_consistency(
            previous.size,
            latest.size,
            &proof,
            &previous.hash,
            &latest.hash,
        )?;

        let mut new_entries = 0u64;
        for bundle in bundle_range(previous.size, latest.size, latest.size) {
            let bytes = self
                .reader
                .read_entry_bundle(bundle.index, bundle.width)
                .await?;
            let entries = parse_entry_bundle(&bytes)?;
            for entry in entries.iter().skip(bundle.first) {
                self.check_entry(entry, &mut id_map)?;
                new_entries += 1;
            }
        }

        self.state.persist(&latest_bytes, &id_map).await?;
        info!(
            from = previous.size,
            to = latest.size,
            entries = new_entries,
            "round complete"
        );
        Ok(RoundOutcome {
            previous_size: previous.size,
            latest_size: latest.size,
            new_entries,
        })
    }

    /// Parse one entry and enforce the identity→digest binding.
    fn check_entry(
        &self,
        entry: &[u8],
        id_map: &mut std::collections::BTreeMap<String, String>,
    ) -> Result<(), MonitorError> {
        let text = std::str::from_utf8(entry).map_err(|_| MonitorError::BadEntry {
            purl: String::from_utf8_lossy(entry).into_owned(),
            reason: "entry is not UTF-8".to_string(),
        })?;
        let purl = PackageUrl::parse(text).map_err(|e| MonitorError::BadEntry {
            purl: text.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(filters) = &self.filters
            && filters.matches(&purl)
        {
            info!(purl = %purl, "entry found");
        }

        // Uniqueness enforcement is unconditional; the filters above only
        // control the informational logging.
        let checksum = purl
            .qualifier("checksum")
            .ok_or_else(|| MonitorError::BadEntry {
                purl: text.to_string(),
                reason: "missing checksum qualifier".to_string(),
            })?;
        let identity = purl.identity();
        match id_map.get(&identity) {
            Some(existing) if existing != checksum => {
                error!(
                    purl = %purl,
                    identity = %identity,
                    stored = %existing,
                    observed = %checksum,
                    "ALERT: mismatched checksum for purl {identity}, got {existing}, expected {checksum}"
                );
                Err(MonitorError::ChecksumMismatch {
                    identity,
                    existing: existing.clone(),
                    found: checksum.to_string(),
                })
            }
            _ => {
                id_map.insert(identity, checksum.to_string());
                Ok(())
            }
        }
    }
}
