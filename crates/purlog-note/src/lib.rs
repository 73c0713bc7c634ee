//! Signed notes, checkpoints and key handling.
//!
//! A note is a text body followed by a blank line and one or more signature
//! lines; a checkpoint is a note whose body is `origin\nsize\nroot-b64\n`.
//! Signers and verifiers are named Ed25519 keys bound to their name by a
//! 4-byte key hash, in the sumdb note key encoding.
//!
//! This crate also carries the key utilities used by the CLI binaries:
//! keypair generation, verifier-key derivation from PEM/DER public keys,
//! and the witness submission-prefix derivation.

mod checkpoint;
mod error;
mod keys;
mod note;

pub use checkpoint::{Checkpoint, ParsedCheckpoint, parse_checkpoint};
pub use error::NoteError;
pub use keys::{
    Ed25519Signer, Ed25519Verifier, generate_key, parse_spki_public_key, submission_prefix,
};
pub use note::{Note, Signature};
