//! `purlog-print-vkey` — derive the note verifier key for an existing
//! Ed25519 public key (PEM or base64 DER) under a given origin name.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use purlog_note::{Ed25519Verifier, parse_spki_public_key};

#[derive(Parser)]
#[command(name = "purlog-print-vkey", version, about = "print a note verifier key")]
struct Args {
    /// Origin of witness, e.g. example.com/witness.
    #[arg(long)]
    origin: String,

    /// Path to PEM or base64-encoded DER Ed25519 public key.
    #[arg(long)]
    public_key_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.public_key_path)
        .with_context(|| format!("reading {}", args.public_key_path.display()))?;
    let key = parse_spki_public_key(&raw).context("parsing public key")?;
    let verifier = Ed25519Verifier::new(&args.origin, key).context("building verifier")?;
    println!("{}", verifier.to_vkey());
    Ok(())
}
