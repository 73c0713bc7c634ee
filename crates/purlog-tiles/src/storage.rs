//! POSIX tile storage and the batching appender.
//!
//! [`TileStorage`] maps the tlog-tile layout onto a directory with atomic
//! temp+rename writes. [`spawn_appender`] starts the integrator task: adds
//! are batched, the tree state (frontier plus per-level open-tile buffers)
//! is extended in memory, and a publication pass on a timer writes
//! completed tiles, current partials and a freshly signed checkpoint. When
//! a [`CheckpointWitness`] is configured, the checkpoint is only published
//! once a cosignature has been obtained.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use purlog_merkle::{Hash, empty_root, hash_children, hash_leaf};
use purlog_note::{Checkpoint, Ed25519Signer, Note};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::error::TileError;
use crate::layout::{
    ENTRY_BUNDLE_WIDTH, TILE_HEIGHT, TILE_WIDTH, checkpoint_path, encode_entry_bundle,
    entry_bundle_path, parse_entry_bundle, parse_hash_tile, tile_path,
};
use crate::proofs::{ProofBuilder, largest_pow2_leq};

// -----------------------------------------------------------------------
// Reader traits
// -----------------------------------------------------------------------

/// Read access to hash tiles.
#[async_trait]
pub trait TileReader: Send + Sync {
    /// Fetch the raw bytes of the tile at `(level, index)` with the given
    /// width (256 for a full tile, less for a partial one).
    async fn read_tile(&self, level: u32, index: u64, width: u16) -> Result<Vec<u8>, TileError>;
}

/// Read access to the full log surface: checkpoint, tiles and entries.
#[async_trait]
pub trait LogReader: TileReader {
    /// Fetch the latest signed checkpoint bytes.
    async fn read_checkpoint(&self) -> Result<Vec<u8>, TileError>;

    /// Fetch the raw bytes of an entry bundle.
    async fn read_entry_bundle(&self, index: u64, width: u16) -> Result<Vec<u8>, TileError>;
}

/// A party that cosigns checkpoints before they are published.
///
/// Implementations verify consistency from their previously trusted state
/// (fetching proofs through `reader`) and return the signature line(s) to
/// append to the note. Publication fails closed on error.
#[async_trait]
pub trait CheckpointWitness: Send + Sync {
    /// Obtain cosignature line(s) for `signed_checkpoint` covering a tree
    /// of `size` leaves.
    async fn cosign(
        &self,
        signed_checkpoint: &[u8],
        size: u64,
        reader: &dyn TileReader,
    ) -> Result<String, TileError>;
}

// -----------------------------------------------------------------------
// TileStorage
// -----------------------------------------------------------------------

/// Directory-backed tile store.
#[derive(Debug, Clone)]
pub struct TileStorage {
    dir: PathBuf,
}

impl TileStorage {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, TileError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The storage root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read(&self, rel: &str) -> Result<Vec<u8>, TileError> {
        match tokio::fs::read(self.dir.join(rel)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TileError::NotFound(rel.to_string()))
            }
            Err(e) => Err(TileError::Io(e)),
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    async fn write_atomic(&self, rel: &str, bytes: &[u8]) -> Result<(), TileError> {
        let path = self.dir.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl TileReader for TileStorage {
    async fn read_tile(&self, level: u32, index: u64, width: u16) -> Result<Vec<u8>, TileError> {
        self.read(&tile_path(level, index, width)).await
    }
}

#[async_trait]
impl LogReader for TileStorage {
    async fn read_checkpoint(&self) -> Result<Vec<u8>, TileError> {
        self.read(checkpoint_path()).await
    }

    async fn read_entry_bundle(&self, index: u64, width: u16) -> Result<Vec<u8>, TileError> {
        self.read(&entry_bundle_path(index, width)).await
    }
}

// -----------------------------------------------------------------------
// Appender
// -----------------------------------------------------------------------

/// Tuning knobs for the appender.
#[derive(Debug, Clone)]
pub struct AppendOptions {
    /// Checkpoint origin (the log's logical name).
    pub origin: String,
    /// Maximum entries integrated per batch.
    pub batch_max_entries: usize,
    /// Maximum time the integrator waits to fill a batch.
    pub batch_max_wait: Duration,
    /// How often a new checkpoint is published.
    pub checkpoint_interval: Duration,
    /// Size of the duplicate-entry suppression window.
    pub antispam_window: usize,
}

impl AppendOptions {
    /// Defaults matching the log's documented cadence: batches of 256 with
    /// a 1s fill window, checkpoints every 5s, a 256-entry antispam window.
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            batch_max_entries: 256,
            batch_max_wait: Duration::from_secs(1),
            checkpoint_interval: Duration::from_secs(5),
            antispam_window: 256,
        }
    }
}

/// A published checkpoint: its size plus the exact bytes served to readers.
#[derive(Debug, Clone)]
pub struct PublishedCheckpoint {
    /// Tree size the checkpoint covers.
    pub size: u64,
    /// Raw signed (and possibly co-signed) note bytes.
    pub bytes: Vec<u8>,
}

struct AddRequest {
    entry: Vec<u8>,
    done: oneshot::Sender<Result<u64, TileError>>,
}

/// Handle for submitting entries and observing publication.
#[derive(Clone)]
pub struct Appender {
    tx: mpsc::Sender<AddRequest>,
    published: watch::Receiver<Option<PublishedCheckpoint>>,
}

impl Appender {
    /// Append an entry, resolving to its assigned index once integrated.
    ///
    /// A duplicate of a recently added entry resolves to the original
    /// index without growing the log.
    pub async fn add(&self, entry: Vec<u8>) -> Result<u64, TileError> {
        if entry.len() > u16::MAX as usize {
            return Err(TileError::EntryTooLarge(entry.len()));
        }
        let (done, done_rx) = oneshot::channel();
        self.tx
            .send(AddRequest { entry, done })
            .await
            .map_err(|_| TileError::Closed)?;
        done_rx.await.map_err(|_| TileError::Closed)?
    }

    /// Wait until a checkpoint covering `index` has been published.
    pub async fn await_publication(&self, index: u64) -> Result<PublishedCheckpoint, TileError> {
        let mut rx = self.published.clone();
        loop {
            if let Some(cp) = rx.borrow_and_update().as_ref()
                && cp.size > index
            {
                return Ok(cp.clone());
            }
            rx.changed().await.map_err(|_| TileError::Closed)?;
        }
    }

    /// The most recently published checkpoint, if any.
    pub fn latest_published(&self) -> Option<PublishedCheckpoint> {
        self.published.borrow().clone()
    }
}

/// Owns the integrator task; dropping without [`shutdown`] aborts pending
/// work at the last published checkpoint.
///
/// [`shutdown`]: AppenderHandle::shutdown
pub struct AppenderHandle {
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl AppenderHandle {
    /// Drain queued adds, integrate them, publish a final checkpoint and
    /// stop the integrator.
    pub async fn shutdown(self) -> Result<(), TileError> {
        let _ = self.shutdown_tx.send(true);
        self.task.await.map_err(|_| TileError::Closed)
    }
}

/// Start the integrator for `storage` and return the add/publication
/// handles. Recovers in-memory tree state from the stored checkpoint.
pub async fn spawn_appender(
    storage: TileStorage,
    signer: Ed25519Signer,
    options: AppendOptions,
    witness: Option<Arc<dyn CheckpointWitness>>,
) -> Result<(Appender, AppenderHandle), TileError> {
    let (state, recovered) = load_state(&storage, &options.origin).await?;
    info!(size = state.size, dir = %storage.dir().display(), "opened tile storage");

    let last_published = recovered.as_ref().map(|cp| cp.size);
    let (published_tx, published_rx) = watch::channel(recovered);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::channel(1024);

    let integrator = Integrator {
        storage,
        state,
        signer,
        witness,
        antispam: AntispamCache::new(options.antispam_window),
        options,
        published_tx,
        last_published,
    };
    let task = tokio::spawn(integrator.run(rx, shutdown_rx));

    Ok((
        Appender {
            tx,
            published: published_rx,
        },
        AppenderHandle { shutdown_tx, task },
    ))
}

// -----------------------------------------------------------------------
// Tree state
// -----------------------------------------------------------------------

/// In-memory image of the tree's ragged right edge.
#[derive(Debug, Default)]
struct TreeState {
    /// Number of integrated leaves.
    size: u64,
    /// Roots of the perfect subtrees in the binary decomposition of
    /// `size`, largest first.
    frontier: Vec<Hash>,
    /// Per tile level: hashes in the currently open tile.
    tile_bufs: Vec<Vec<Hash>>,
    /// Entries in the currently open bundle.
    bundle_buf: Vec<Vec<u8>>,
    /// Completed full tiles/bundles awaiting flush at publication.
    completed: Vec<(String, Vec<u8>)>,
}

impl TreeState {
    /// Append one entry, returning its index.
    fn append(&mut self, entry: &[u8]) -> u64 {
        let index = self.size;

        self.bundle_buf.push(entry.to_vec());
        if self.bundle_buf.len() as u64 == ENTRY_BUNDLE_WIDTH {
            self.completed.push((
                entry_bundle_path(index / ENTRY_BUNDLE_WIDTH, ENTRY_BUNDLE_WIDTH as u16),
                encode_entry_bundle(&self.bundle_buf),
            ));
            self.bundle_buf.clear();
        }

        // Standard binary-counter merge: each completed node bubbles up
        // while the corresponding size bit is set.
        let mut h = hash_leaf(entry);
        self.record_node(0, h);
        let mut level = 0u32;
        let mut n = self.size;
        while n & 1 == 1 {
            let left = self.frontier.pop().expect("set size bit has a frontier root");
            h = hash_children(&left, &h);
            level += 1;
            n >>= 1;
            self.record_node(level, h);
        }
        self.frontier.push(h);
        self.size += 1;
        index
    }

    /// Record a completed node hash; tile rows exist only for tree levels
    /// that are multiples of [`TILE_HEIGHT`].
    fn record_node(&mut self, level: u32, h: Hash) {
        if level % TILE_HEIGHT != 0 {
            return;
        }
        let tl = (level / TILE_HEIGHT) as usize;
        if self.tile_bufs.len() <= tl {
            self.tile_bufs.resize(tl + 1, Vec::new());
        }
        let buf = &mut self.tile_bufs[tl];
        buf.push(h);
        if buf.len() as u64 == TILE_WIDTH {
            let node_index = ((self.size + 1) >> level) - 1;
            let tile_index = node_index / TILE_WIDTH;
            let mut bytes = Vec::with_capacity(buf.len() * 32);
            for hash in buf.iter() {
                bytes.extend_from_slice(hash);
            }
            buf.clear();
            self.completed
                .push((tile_path(tl as u32, tile_index, TILE_WIDTH as u16), bytes));
        }
    }

    /// Current root hash.
    fn root(&self) -> Hash {
        match self.frontier.split_last() {
            None => empty_root(),
            Some((last, rest)) => {
                let mut root = *last;
                for left in rest.iter().rev() {
                    root = hash_children(left, &root);
                }
                root
            }
        }
    }

    /// Partial tile and bundle files for the current size.
    fn partial_files(&self) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        if !self.bundle_buf.is_empty() {
            files.push((
                entry_bundle_path(self.size / ENTRY_BUNDLE_WIDTH, self.bundle_buf.len() as u16),
                encode_entry_bundle(&self.bundle_buf),
            ));
        }
        for (tl, buf) in self.tile_bufs.iter().enumerate() {
            if buf.is_empty() {
                continue;
            }
            let count = self.size >> (tl as u32 * TILE_HEIGHT);
            let mut bytes = Vec::with_capacity(buf.len() * 32);
            for hash in buf {
                bytes.extend_from_slice(hash);
            }
            files.push((
                tile_path(tl as u32, count / TILE_WIDTH, buf.len() as u16),
                bytes,
            ));
        }
        files
    }
}

/// Reload tree state from the stored checkpoint and its partial tiles.
async fn load_state(
    storage: &TileStorage,
    origin: &str,
) -> Result<(TreeState, Option<PublishedCheckpoint>), TileError> {
    let cp_bytes = match storage.read(checkpoint_path()).await {
        Ok(b) => b,
        Err(TileError::NotFound(_)) => return Ok((TreeState::default(), None)),
        Err(e) => return Err(e),
    };
    // Our own file; the signature is not re-verified here, but the root is
    // recomputed below and must match.
    let note = Note::parse(&cp_bytes)?;
    let cp = Checkpoint::from_body(&note.text)?;
    if cp.origin != origin {
        return Err(TileError::BadTile(format!(
            "stored checkpoint origin {:?} does not match configured origin {:?}",
            cp.origin, origin
        )));
    }

    let mut state = TreeState {
        size: cp.size,
        ..TreeState::default()
    };

    let open_entries = cp.size % ENTRY_BUNDLE_WIDTH;
    if open_entries > 0 {
        let bytes = storage
            .read_entry_bundle(cp.size / ENTRY_BUNDLE_WIDTH, open_entries as u16)
            .await?;
        state.bundle_buf = parse_entry_bundle(&bytes)?;
        if state.bundle_buf.len() as u64 != open_entries {
            return Err(TileError::BadTile(format!(
                "open bundle holds {} entries, checkpoint implies {open_entries}",
                state.bundle_buf.len()
            )));
        }
    }

    let mut tl = 0u32;
    loop {
        let count = cp.size >> (tl * TILE_HEIGHT);
        if count == 0 {
            break;
        }
        let open = count % TILE_WIDTH;
        let buf = if open > 0 {
            let bytes = storage.read_tile(tl, count / TILE_WIDTH, open as u16).await?;
            parse_hash_tile(&bytes, open as u16)?
        } else {
            Vec::new()
        };
        state.tile_bufs.push(buf);
        tl += 1;
    }

    // Frontier roots are complete aligned nodes, so they come out of the
    // proof machinery directly.
    let mut builder = ProofBuilder::new(storage, cp.size);
    let mut offset = 0u64;
    let mut remaining = cp.size;
    while remaining > 0 {
        let span = largest_pow2_leq(remaining);
        let level = span.trailing_zeros();
        state.frontier.push(builder.node_hash(level, offset >> level).await?);
        offset += span;
        remaining -= span;
    }

    if state.root() != cp.hash {
        return Err(TileError::BadTile(
            "recovered tree root does not match stored checkpoint".to_string(),
        ));
    }

    Ok((
        state,
        Some(PublishedCheckpoint {
            size: cp.size,
            bytes: cp_bytes,
        }),
    ))
}

// -----------------------------------------------------------------------
// Integrator
// -----------------------------------------------------------------------

/// Bounded map of recent leaf hashes to their assigned indices.
struct AntispamCache {
    map: HashMap<Hash, u64>,
    order: VecDeque<Hash>,
    cap: usize,
}

impl AntispamCache {
    fn new(cap: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    fn get(&self, h: &Hash) -> Option<u64> {
        self.map.get(h).copied()
    }

    fn insert(&mut self, h: Hash, index: u64) {
        if self.cap == 0 {
            return;
        }
        if self.order.len() == self.cap
            && let Some(evicted) = self.order.pop_front()
        {
            self.map.remove(&evicted);
        }
        self.order.push_back(h);
        self.map.insert(h, index);
    }
}

struct Integrator {
    storage: TileStorage,
    state: TreeState,
    signer: Ed25519Signer,
    witness: Option<Arc<dyn CheckpointWitness>>,
    antispam: AntispamCache,
    options: AppendOptions,
    published_tx: watch::Sender<Option<PublishedCheckpoint>>,
    last_published: Option<u64>,
}

impl Integrator {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<AddRequest>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.options.checkpoint_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    rx.close();
                    while let Some(req) = rx.recv().await {
                        self.integrate(req);
                    }
                    if let Err(e) = self.publish().await {
                        error!(error = %e, "final checkpoint publication failed");
                    }
                    info!(size = self.state.size, "integrator stopped");
                    break;
                }
                maybe_req = rx.recv() => {
                    match maybe_req {
                        Some(req) => self.fill_batch(req, &mut rx).await,
                        None => {
                            if let Err(e) = self.publish().await {
                                error!(error = %e, "final checkpoint publication failed");
                            }
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.publish().await {
                        error!(error = %e, "checkpoint publication failed");
                    }
                }
            }
        }
    }

    /// Collect up to `batch_max_entries` within `batch_max_wait`, then
    /// integrate them all.
    async fn fill_batch(&mut self, first: AddRequest, rx: &mut mpsc::Receiver<AddRequest>) {
        let mut batch = vec![first];
        let deadline = tokio::time::sleep(self.options.batch_max_wait);
        tokio::pin!(deadline);
        while batch.len() < self.options.batch_max_entries {
            tokio::select! {
                _ = &mut deadline => break,
                more = rx.recv() => match more {
                    Some(req) => batch.push(req),
                    None => break,
                }
            }
        }
        let n = batch.len();
        for req in batch {
            self.integrate(req);
        }
        debug!(batch = n, size = self.state.size, "integrated batch");
    }

    fn integrate(&mut self, req: AddRequest) {
        let leaf = hash_leaf(&req.entry);
        if let Some(index) = self.antispam.get(&leaf) {
            debug!(index, "duplicate entry resolved from antispam window");
            let _ = req.done.send(Ok(index));
            return;
        }
        let index = self.state.append(&req.entry);
        self.antispam.insert(leaf, index);
        let _ = req.done.send(Ok(index));
    }

    /// Flush dirty files and publish a signed checkpoint for the current
    /// size. No-op if nothing changed since the last publication.
    async fn publish(&mut self) -> Result<(), TileError> {
        if self.last_published == Some(self.state.size) {
            return Ok(());
        }

        for (path, bytes) in std::mem::take(&mut self.state.completed) {
            self.storage.write_atomic(&path, &bytes).await?;
        }
        for (path, bytes) in self.state.partial_files() {
            self.storage.write_atomic(&path, &bytes).await?;
        }

        let cp = Checkpoint {
            origin: self.options.origin.clone(),
            size: self.state.size,
            hash: self.state.root(),
        };
        let mut note = Note::new(&cp.to_body())?;
        note.add_signature(&self.signer);
        let mut bytes = note.encode();

        // Fail closed: without a cosignature the checkpoint stays
        // unpublished and the next tick retries.
        if let Some(witness) = &self.witness {
            let cosig = witness.cosign(&bytes, cp.size, &self.storage).await?;
            bytes.extend_from_slice(cosig.as_bytes());
        }

        self.storage.write_atomic(checkpoint_path(), &bytes).await?;
        self.last_published = Some(cp.size);
        info!(size = cp.size, "published checkpoint");
        let _ = self.published_tx.send(Some(PublishedCheckpoint {
            size: cp.size,
            bytes,
        }));
        Ok(())
    }
}
