//! `purlog-witness-add-key` — register a log's public key with a witness
//! database, starting from the empty tree. Re-registering an existing
//! origin is a no-op.

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use purlog_merkle::empty_root;
use purlog_note::Ed25519Verifier;
use purlog_witness::WitnessDb;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "purlog-witness-add-key",
    version,
    about = "register a log key with a witness database"
)]
struct Args {
    /// Path to checkpoint database (for sqlite).
    #[arg(long)]
    database_path: Option<String>,

    /// Database data source name.
    #[arg(long)]
    db_dsn: Option<String>,

    /// Database type (sqlite, mysql, postgres).
    #[arg(long, default_value = "sqlite")]
    db_type: String,

    /// Location of the log's public key file (note verifier format).
    #[arg(long)]
    public_key: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    purlog_cli::init_tracing("info", false);
    let args = Args::parse();

    let (dialect, dsn) = purlog_cli::resolve_db(
        &args.db_type,
        args.database_path.as_deref(),
        args.db_dsn.as_deref(),
    )?;

    let vkey = std::fs::read_to_string(&args.public_key)
        .with_context(|| format!("reading {}", args.public_key.display()))?;
    let verifier = Ed25519Verifier::from_vkey(&vkey).context("parsing public key")?;

    let db = WitnessDb::connect(dialect, &dsn)
        .await
        .context("opening witness database")?;

    let inserted = db
        .register(
            verifier.name(),
            vkey.trim(),
            0,
            &BASE64.encode(empty_root()),
        )
        .await
        .context("registering origin")?;
    if inserted {
        info!(origin = verifier.name(), "registered log key");
    } else {
        info!(origin = verifier.name(), "origin already exists, skipping");
    }
    Ok(())
}
