//! End-to-end flows across log, witness and monitor over real HTTP.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_client::{HttpLogReader, WitnessClient};
use purlog_integration_tests::*;
use purlog_merkle::{Hash, empty_root, hash_leaf, verify_inclusion};
use purlog_monitor::{Monitor, MonitorError};
use purlog_note::parse_checkpoint;

#[tokio::test]
async fn test_add_returns_self_verifying_proof() {
    let keys = log_keys();
    let log = start_log(&keys, "pypi", None).await;

    let purl = pypi_purl("foo", "1.0", &digest_of('c'));
    let (status, body) = post_add(&log.url, &purl).await;
    assert_eq!(status, 200, "{}", String::from_utf8_lossy(&body));

    let response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let index = response["index"].as_u64().unwrap();
    let checkpoint_bytes = BASE64
        .decode(response["checkpoint"].as_str().unwrap())
        .unwrap();
    let cp = parse_checkpoint(&checkpoint_bytes, LOG_ORIGIN, &log.verifier)
        .unwrap()
        .checkpoint;
    let proof: Vec<Hash> = response["inclusionProof"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| {
            BASE64
                .decode(v.as_str().unwrap())
                .unwrap()
                .try_into()
                .unwrap()
        })
        .collect();
    verify_inclusion(&hash_leaf(purl.as_bytes()), index, cp.size, &proof, &cp.hash).unwrap();

    log.shutdown().await;
}

#[tokio::test]
async fn test_wrong_type_rejected_with_message() {
    let keys = log_keys();
    let log = start_log(&keys, "deb", None).await;

    let (status, body) = post_add(&log.url, &pypi_purl("foo", "1.0", &digest_of('c'))).await;
    assert_eq!(status, 400);
    assert!(
        String::from_utf8_lossy(&body).contains("pURL type must be deb"),
        "body: {}",
        String::from_utf8_lossy(&body)
    );
    log.shutdown().await;
}

#[tokio::test]
async fn test_monitor_tails_log_over_http() {
    let keys = log_keys();
    let log = start_log(&keys, "pypi", None).await;
    let state_dir = tempfile::tempdir().unwrap();

    for (name, version) in [("foo", "1.0"), ("bar", "2.0"), ("baz", "3.0")] {
        let (status, _) = post_add(&log.url, &pypi_purl(name, version, &digest_of('d'))).await;
        assert_eq!(status, 200);
    }

    let reader = HttpLogReader::new(&log.url).unwrap();
    let mut monitor = Monitor::new(reader, log.verifier.clone(), state_dir.path(), None);
    let outcome = monitor.run_round().await.unwrap();
    assert_eq!(outcome.previous_size, 0);
    assert_eq!(outcome.latest_size, 3);

    // Another entry, another (incremental) round.
    let (status, _) = post_add(&log.url, &pypi_purl("qux", "4.0", &digest_of('d'))).await;
    assert_eq!(status, 200);
    let outcome = monitor.run_round().await.unwrap();
    assert_eq!(outcome.previous_size, 3);
    assert_eq!(outcome.latest_size, 4);
    assert_eq!(outcome.new_entries, 1);

    log.shutdown().await;
}

#[tokio::test]
async fn test_monitor_detects_rebound_identity() {
    let keys = log_keys();
    let log = start_log(&keys, "pypi", None).await;
    let state_dir = tempfile::tempdir().unwrap();

    // Both entries are individually valid, so the log accepts them; the
    // binding violation is the monitor's to catch.
    let (status, _) = post_add(&log.url, &pypi_purl("foo", "1.0", &digest_of('a'))).await;
    assert_eq!(status, 200);

    let reader = HttpLogReader::new(&log.url).unwrap();
    let mut monitor = Monitor::new(reader, log.verifier.clone(), state_dir.path(), None);
    monitor.run_round().await.unwrap();

    let (status, _) = post_add(&log.url, &pypi_purl("foo", "1.0", &digest_of('b'))).await;
    assert_eq!(status, 200);

    match monitor.run_round().await.unwrap_err() {
        MonitorError::ChecksumMismatch { identity, .. } => {
            assert_eq!(identity, "pkg:pypi/foo@1.0");
        }
        other => panic!("expected checksum mismatch, got {other}"),
    }
    log.shutdown().await;
}

#[tokio::test]
async fn test_witnessed_log_publishes_cosigned_checkpoints() {
    let keys = log_keys();
    let witness = start_witness(&[(LOG_ORIGIN, &keys.vkey, 0, empty_root())]).await;
    let client = WitnessClient::new(&witness.url, &witness.vkey).unwrap();
    let log = start_log(&keys, "pypi", Some(Arc::new(client))).await;

    let (status, body) = post_add(&log.url, &pypi_purl("foo", "1.0", &digest_of('e'))).await;
    assert_eq!(status, 200, "{}", String::from_utf8_lossy(&body));

    let response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let checkpoint_bytes = BASE64
        .decode(response["checkpoint"].as_str().unwrap())
        .unwrap();
    let parsed = parse_checkpoint(&checkpoint_bytes, LOG_ORIGIN, &log.verifier).unwrap();

    // Log signature plus witness cosignature, both verifiable.
    assert_eq!(parsed.note.signatures.len(), 2);
    parsed.note.verify(&witness.verifier).unwrap();

    // The witness advanced to the published size.
    assert_eq!(
        witness.db.tree_size(LOG_ORIGIN).await.unwrap(),
        Some(parsed.checkpoint.size)
    );

    // The monitor accepts co-signed checkpoints as long as the log
    // signature verifies.
    let state_dir = tempfile::tempdir().unwrap();
    let reader = HttpLogReader::new(&log.url).unwrap();
    let mut monitor = Monitor::new(reader, log.verifier.clone(), state_dir.path(), None);
    monitor.run_round().await.unwrap();

    log.shutdown().await;
    witness.shutdown();
}
