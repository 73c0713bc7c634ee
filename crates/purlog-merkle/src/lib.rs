//! RFC 6962 Merkle tree primitives.
//!
//! Leaf and interior node hashing with the standard domain separation
//! (`0x00` / `0x01` prefixes over SHA-256), verification of inclusion and
//! consistency proofs, and an in-memory tree used by tests and by callers
//! that hold all leaves.
//!
//! Proof *construction* against a tiled log lives in `purlog-tiles`; this
//! crate is pure and does no I/O.

mod hasher;
mod proof;
mod tree;

pub use hasher::{Hash, empty_root, hash_children, hash_leaf};
pub use proof::{ProofError, verify_consistency, verify_inclusion};
pub use tree::MemoryTree;
