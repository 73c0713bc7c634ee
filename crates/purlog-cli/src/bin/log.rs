//! `purlog-log` — the log server binary.
//!
//! Accepts pURL entries over `POST /add`, serves the tile layout over
//! `GET /checkpoint` and `GET /tile/...`, and optionally requires a
//! witness cosignature before each checkpoint is published.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use purlog_client::WitnessClient;
use purlog_log::{LogServer, LogServerConfig};
use purlog_note::{Ed25519Signer, Ed25519Verifier};
use purlog_tiles::{AppendOptions, CheckpointWitness, TileStorage, spawn_appender};
use tracing::info;

#[derive(Parser)]
#[command(name = "purlog-log", version, about = "purlog transparency log server")]
struct Args {
    /// Host to listen on.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Root directory to store log data.
    #[arg(long)]
    storage_dir: PathBuf,

    /// Restricts pURLs to be of a specific type.
    #[arg(long)]
    purl_type: String,

    /// Location of the log's private key file.
    #[arg(long)]
    private_key: PathBuf,

    /// Location of the log's public key file.
    #[arg(long)]
    public_key: PathBuf,

    /// Optional witness to cosign checkpoints. When set, checkpoints are
    /// only published once cosigned.
    #[arg(long)]
    witness_url: Option<String>,

    /// Optional witness public key location to verify cosignatures.
    #[arg(long)]
    witness_public_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    purlog_cli::init_tracing("info", false);
    let args = Args::parse();

    if args.witness_url.is_some() != args.witness_public_key.is_some() {
        bail!("--witness-url and --witness-public-key must both be set");
    }

    let skey = std::fs::read_to_string(&args.private_key)
        .with_context(|| format!("reading {}", args.private_key.display()))?;
    let signer = Ed25519Signer::from_skey(&skey).context("parsing private key")?;
    let vkey = std::fs::read_to_string(&args.public_key)
        .with_context(|| format!("reading {}", args.public_key.display()))?;
    let verifier = Ed25519Verifier::from_vkey(&vkey).context("parsing public key")?;
    if verifier.key_hash() != signer.key_hash() {
        bail!("--public-key does not match --private-key");
    }

    let witness: Option<Arc<dyn CheckpointWitness>> = match (&args.witness_url, &args.witness_public_key)
    {
        (Some(url), Some(key_path)) => {
            let witness_vkey = std::fs::read_to_string(key_path)
                .with_context(|| format!("reading {}", key_path.display()))?;
            let client = WitnessClient::new(url, &witness_vkey).context("creating witness client")?;
            info!(url, "checkpoint publication requires witness cosignature");
            Some(Arc::new(client))
        }
        _ => None,
    };

    let storage = TileStorage::new(&args.storage_dir).context("opening storage directory")?;
    let (appender, handle) = spawn_appender(
        storage.clone(),
        signer,
        AppendOptions::new(verifier.name()),
        witness,
    )
    .await
    .context("starting appender")?;

    let server = LogServer::new(LogServerConfig {
        appender,
        storage,
        purl_type: args.purl_type,
        verifier,
    });

    let addr = format!("{}:{}", args.host, args.port);
    server
        .serve_with_shutdown(&addr, purlog_cli::shutdown_signal())
        .await
        .context("log server failed")?;

    // HTTP has drained; flush pending entries and publish a final checkpoint.
    handle.shutdown().await.context("appender shutdown failed")?;
    info!("shutdown complete");
    Ok(())
}
