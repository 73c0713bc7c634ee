//! HTTP clients for the log and witness surfaces.
//!
//! [`HttpLogReader`] implements the tile-reader interface over a log's
//! HTTP surface, so the monitor (and anything else holding a log URL) can
//! build and verify proofs remotely. [`WitnessClient`] implements the
//! `add-checkpoint` exchange from the log's side, including the 409
//! size-renegotiation dance.

mod error;
mod reader;
mod witness;

pub use error::ClientError;
pub use reader::HttpLogReader;
pub use witness::WitnessClient;
