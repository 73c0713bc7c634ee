//! `purlog-gen-key` — generate a named Ed25519 keypair in the note key
//! encoding. Refuses to overwrite existing key files.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use purlog_note::generate_key;

#[derive(Parser)]
#[command(name = "purlog-gen-key", version, about = "generate a purlog signing keypair")]
struct Args {
    /// Origin of checkpoint, e.g. example.com/log.
    #[arg(long)]
    origin: String,

    /// Output path for private key.
    #[arg(long, default_value = "private.key")]
    private_key_path: PathBuf,

    /// Output path for public key.
    #[arg(long, default_value = "public.key")]
    public_key_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.private_key_path.exists() {
        bail!("--private-key-path file must not exist");
    }
    if args.public_key_path.exists() {
        bail!("--public-key-path file must not exist");
    }

    let (skey, vkey) = generate_key(&args.origin).context("generating key")?;
    std::fs::write(&args.private_key_path, skey)
        .with_context(|| format!("writing {}", args.private_key_path.display()))?;
    std::fs::write(&args.public_key_path, vkey)
        .with_context(|| format!("writing {}", args.public_key_path.display()))?;
    Ok(())
}
