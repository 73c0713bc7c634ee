//! Shared test harness for purlog integration tests.
//!
//! Spins up real log and witness servers on loopback listeners so the
//! tests exercise the same HTTP surfaces production clients see.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_log::{LogServer, LogServerConfig};
use purlog_merkle::Hash;
use purlog_note::{Ed25519Signer, Ed25519Verifier, generate_key, submission_prefix};
use purlog_tiles::{
    AppendOptions, Appender, AppenderHandle, CheckpointWitness, TileStorage, spawn_appender,
};
use purlog_witness::{Dialect, WitnessDb, WitnessServer};

/// Origin used by all test logs.
pub const LOG_ORIGIN: &str = "example.com/purlog";

/// A generated log identity.
pub struct LogKeys {
    /// Note signer key.
    pub skey: String,
    /// Note verifier key.
    pub vkey: String,
}

/// Generate a fresh log identity.
pub fn log_keys() -> LogKeys {
    let (skey, vkey) = generate_key(LOG_ORIGIN).unwrap();
    LogKeys { skey, vkey }
}

/// A running log server on a loopback port.
pub struct TestLog {
    /// Base URL, e.g. `http://127.0.0.1:PORT`.
    pub url: String,
    /// The log's checkpoint verifier.
    pub verifier: Ed25519Verifier,
    /// Direct handle to the appender (for seeding entries in tests).
    pub appender: Appender,
    handle: AppenderHandle,
    server: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestLog {
    /// Stop the server and flush the appender.
    pub async fn shutdown(self) {
        self.server.abort();
        self.handle.shutdown().await.unwrap();
    }
}

/// Start a log accepting entries of `purl_type`, optionally requiring a
/// witness cosignature on every published checkpoint.
pub async fn start_log(
    keys: &LogKeys,
    purl_type: &str,
    witness: Option<Arc<dyn CheckpointWitness>>,
) -> TestLog {
    let dir = tempfile::tempdir().unwrap();
    let signer = Ed25519Signer::from_skey(&keys.skey).unwrap();
    let verifier = Ed25519Verifier::from_vkey(&keys.vkey).unwrap();

    let storage = TileStorage::new(dir.path()).unwrap();
    let options = AppendOptions {
        batch_max_wait: Duration::from_millis(1),
        checkpoint_interval: Duration::from_millis(10),
        ..AppendOptions::new(LOG_ORIGIN)
    };
    let (appender, handle) = spawn_appender(storage.clone(), signer, options, witness)
        .await
        .unwrap();

    let server = LogServer::new(LogServerConfig {
        appender: appender.clone(),
        storage,
        purl_type: purl_type.to_string(),
        verifier: verifier.clone(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.into_router();
    let server = tokio::spawn(async move {
        axum_serve(listener, router).await;
    });

    TestLog {
        url: format!("http://{addr}"),
        verifier,
        appender,
        handle,
        server,
        _dir: dir,
    }
}

async fn axum_serve(listener: tokio::net::TcpListener, router: axum::Router) {
    axum::serve(listener, router).await.ok();
}

/// A running witness server on a loopback port.
pub struct TestWitness {
    /// Base URL (without the submission prefix).
    pub url: String,
    /// The witness's verifier key string.
    pub vkey: String,
    /// The witness's checkpoint verifier.
    pub verifier: Ed25519Verifier,
    /// Submission prefix (hex SHA-256 of the raw public key).
    pub prefix: String,
    /// Direct handle to the record store.
    pub db: WitnessDb,
    server: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestWitness {
    /// Stop the server.
    pub fn shutdown(self) {
        self.server.abort();
    }
}

/// Start a witness with the given origins pre-registered.
pub async fn start_witness(registered: &[(&str, &str, u64, Hash)]) -> TestWitness {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("tlog.db").display());
    let db = WitnessDb::connect(Dialect::Sqlite, &dsn).await.unwrap();
    for (origin, vkey, size, hash) in registered {
        db.register(origin, vkey, *size, &BASE64.encode(hash))
            .await
            .unwrap();
    }

    let (skey, vkey) = generate_key("example.com/witness").unwrap();
    let signer = Ed25519Signer::from_skey(&skey).unwrap();
    let verifier = Ed25519Verifier::from_vkey(&vkey).unwrap();
    let prefix = submission_prefix(&verifier);

    let server = WitnessServer::new(db.clone(), signer);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.into_router();
    let server = tokio::spawn(async move {
        axum_serve(listener, router).await;
    });

    TestWitness {
        url: format!("http://{addr}"),
        vkey,
        verifier,
        prefix,
        db,
        server,
        _dir: dir,
    }
}

/// `POST /add` a pURL to a running log.
pub async fn post_add(log_url: &str, purl: &str) -> (u16, Vec<u8>) {
    let response = reqwest::Client::new()
        .post(format!("{log_url}/add"))
        .body(format!("{{\"purl\":\"{purl}\"}}"))
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = response.bytes().await.unwrap().to_vec();
    (status, body)
}

/// Frame an `add-checkpoint` submission body.
pub fn witness_submission(old: u64, proof: &[Hash], checkpoint: &[u8]) -> Vec<u8> {
    let mut body = format!("old {old}\n");
    for h in proof {
        body.push_str(&BASE64.encode(h));
        body.push('\n');
    }
    body.push('\n');
    let mut bytes = body.into_bytes();
    bytes.extend_from_slice(checkpoint);
    bytes
}

/// A valid pypi entry for `name@version` with the given digest.
pub fn pypi_purl(name: &str, version: &str, digest: &str) -> String {
    format!("pkg:pypi/{name}@{version}?checksum=sha256:{digest}")
}

/// 64 hex characters of the given nibble.
pub fn digest_of(nibble: char) -> String {
    std::iter::repeat_n(nibble, 64).collect()
}
