//! Tiled Merkle log: layout, storage and proof construction.
//!
//! The log's on-disk and on-wire representation follows the tlog-tile
//! layout: `checkpoint` holds the latest signed checkpoint, `tile/<L>/<N>`
//! holds 256 node hashes at tree level `L*8`, and `tile/entries/<N>` holds
//! bundles of up to 256 length-prefixed entries. Partial tiles and bundles
//! get a `.p/<W>` suffix.
//!
//! [`TileStorage`] is the POSIX store; [`spawn_appender`] starts the
//! batching integrator and checkpoint publication tasks behind an
//! [`Appender`] handle. [`ProofBuilder`] constructs RFC 6962 inclusion and
//! consistency proofs from any [`TileReader`], local or remote.

mod error;
mod layout;
mod proofs;
mod storage;

pub use error::TileError;
pub use layout::{
    Bundle, ENTRY_BUNDLE_WIDTH, TILE_HEIGHT, TILE_WIDTH, bundle_range, checkpoint_path,
    encode_entry_bundle, entry_bundle_path, parse_entry_bundle, parse_hash_tile, tile_path,
    tile_width,
};
pub use proofs::ProofBuilder;
pub use storage::{
    AppendOptions, Appender, AppenderHandle, CheckpointWitness, LogReader, PublishedCheckpoint,
    TileReader, TileStorage, spawn_appender,
};
