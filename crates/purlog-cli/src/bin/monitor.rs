//! `purlog-monitor` — the log monitor binary.
//!
//! Tails a log, verifies Merkle consistency each round, and enforces the
//! one-to-one binding between package identity and content digest. A
//! detected violation is fatal: the alert is logged, persisted state is
//! left untouched, and the process exits nonzero.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use purlog_client::HttpLogReader;
use purlog_monitor::{Monitor, PurlFilters};
use purlog_note::Ed25519Verifier;
use regex::Regex;
use tracing::info;

#[derive(Parser)]
#[command(name = "purlog-monitor", version, about = "purlog transparency log monitor")]
struct Args {
    /// Log URL.
    #[arg(long)]
    log_url: String,

    /// Path for log public key.
    #[arg(long)]
    public_key: PathBuf,

    /// Directory to store last verified checkpoint and identity map.
    #[arg(long)]
    storage_dir: PathBuf,

    /// Whether to run one round or loop. Pass `--once=false` to loop.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    once: bool,

    /// How often to run the monitor when looping.
    #[arg(long, default_value = "1m", value_parser = purlog_cli::parse_duration)]
    frequency: std::time::Duration,

    /// Print additional information.
    #[arg(long)]
    debug: bool,

    /// Output log messages as JSON.
    #[arg(long)]
    json_logging: bool,

    /// Regex to match pURL type. Must set all pURL regex if set.
    #[arg(long)]
    purl_type_regex: Option<String>,

    /// Regex to match pURL namespace. Must set all pURL regex if set.
    #[arg(long)]
    purl_namespace_regex: Option<String>,

    /// Regex to match pURL name. Must set all pURL regex if set.
    #[arg(long)]
    purl_name_regex: Option<String>,

    /// Regex to match pURL version. Must set all pURL regex if set.
    #[arg(long)]
    purl_version_regex: Option<String>,
}

impl Args {
    /// The four filter regexes only take effect when all are provided.
    fn filters(&self) -> Result<Option<PurlFilters>> {
        match (
            &self.purl_type_regex,
            &self.purl_namespace_regex,
            &self.purl_name_regex,
            &self.purl_version_regex,
        ) {
            (Some(ty), Some(namespace), Some(name), Some(version)) => Ok(Some(PurlFilters {
                ty: Regex::new(ty).context("invalid --purl-type-regex")?,
                namespace: Regex::new(namespace).context("invalid --purl-namespace-regex")?,
                name: Regex::new(name).context("invalid --purl-name-regex")?,
                version: Regex::new(version).context("invalid --purl-version-regex")?,
            })),
            (None, None, None, None) => Ok(None),
            _ => bail!("all four --purl-*-regex flags must be set together"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    purlog_cli::init_tracing(level, args.json_logging);

    let vkey = std::fs::read_to_string(&args.public_key)
        .with_context(|| format!("reading {}", args.public_key.display()))?;
    let verifier = Ed25519Verifier::from_vkey(&vkey).context("parsing public key")?;
    let filters = args.filters()?;
    let reader = HttpLogReader::new(&args.log_url).context("creating log client")?;

    let mut monitor = Monitor::new(reader, verifier, &args.storage_dir, filters);
    let mut ticker = tokio::time::interval(args.frequency);
    // The first tick is immediate; consume it so the loop below waits a
    // full period between rounds.
    ticker.tick().await;

    loop {
        // A failed round is fatal: misbehavior must page, not be retried
        // into silence.
        monitor.run_round().await.context("monitor round failed")?;
        if args.once {
            return Ok(());
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = purlog_cli::shutdown_signal() => {
                info!("exiting");
                return Ok(());
            }
        }
    }
}
