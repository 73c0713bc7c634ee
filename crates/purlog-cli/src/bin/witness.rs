//! `purlog-witness` — the witness server binary.
//!
//! Maintains per-origin `(size, hash)` state in a SQL database and
//! co-signs checkpoints that prove consistency with it.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use purlog_note::{Ed25519Signer, Ed25519Verifier, submission_prefix};
use purlog_witness::{WitnessDb, WitnessServer};
use tracing::info;

#[derive(Parser)]
#[command(name = "purlog-witness", version, about = "purlog checkpoint witness server")]
struct Args {
    /// Host to listen on.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8081)]
    port: u16,

    /// Path to checkpoint database (for sqlite).
    #[arg(long)]
    database_path: Option<String>,

    /// Database data source name.
    #[arg(long)]
    db_dsn: Option<String>,

    /// Database type (sqlite, mysql, postgres).
    #[arg(long, default_value = "sqlite")]
    db_type: String,

    /// Location of witness private key file.
    #[arg(long)]
    private_key: PathBuf,

    /// Location of witness public key file.
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

    let skey = std::fs::read_to_string(&args.private_key)
        .with_context(|| format!("reading {}", args.private_key.display()))?;
    let signer = Ed25519Signer::from_skey(&skey).context("parsing private key")?;
    let vkey = std::fs::read_to_string(&args.public_key)
        .with_context(|| format!("reading {}", args.public_key.display()))?;
    let verifier = Ed25519Verifier::from_vkey(&vkey).context("parsing public key")?;
    if verifier.key_hash() != signer.key_hash() {
        bail!("--public-key does not match --private-key");
    }

    let db = WitnessDb::connect(dialect, &dsn)
        .await
        .context("opening witness database")?;

    info!(
        prefix = submission_prefix(&verifier),
        "witness submission prefix"
    );
    let server = WitnessServer::new(db, signer);
    let addr = format!("{}:{}", args.host, args.port);
    server
        .serve_with_shutdown(&addr, purlog_cli::shutdown_signal())
        .await
        .context("witness server failed")?;
    info!("shutdown complete");
    Ok(())
}
