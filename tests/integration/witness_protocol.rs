//! The witness exchange over real HTTP: CAS races and replays.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use purlog_integration_tests::*;
use purlog_merkle::{Hash, MemoryTree};
use purlog_note::{Ed25519Signer, Note};

fn tree_with(n: u64) -> MemoryTree {
    let mut t = MemoryTree::new();
    for i in 0..n {
        t.append(format!("entry-{i}").as_bytes());
    }
    t
}

fn signed_checkpoint(skey: &str, size: u64, hash: Hash) -> Vec<u8> {
    let signer = Ed25519Signer::from_skey(skey).unwrap();
    let body = format!("{LOG_ORIGIN}\n{size}\n{}\n", BASE64.encode(hash));
    let mut note = Note::new(&body).unwrap();
    note.add_signature(&signer);
    note.encode()
}

async fn post_submission(url: &str, prefix: &str, body: Vec<u8>) -> (u16, Vec<u8>) {
    let response = reqwest::Client::new()
        .post(format!("{url}/{prefix}/add-checkpoint"))
        .body(body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let bytes = response.bytes().await.unwrap().to_vec();
    (status, bytes)
}

#[tokio::test]
async fn test_concurrent_cas_race_has_exactly_one_winner() {
    let keys = log_keys();
    let tree = tree_with(20);
    let witness = start_witness(&[(LOG_ORIGIN, &keys.vkey, 10, tree.root_at(10))]).await;

    // Two racing submissions, both claiming old=10: one advances to 15,
    // the other to 20.
    let to_15 = witness_submission(
        10,
        &tree.consistency_proof(10, 15),
        &signed_checkpoint(&keys.skey, 15, tree.root_at(15)),
    );
    let to_20 = witness_submission(
        10,
        &tree.consistency_proof(10, 20),
        &signed_checkpoint(&keys.skey, 20, tree.root_at(20)),
    );

    let (first, second) = tokio::join!(
        post_submission(&witness.url, &witness.prefix, to_15),
        post_submission(&witness.url, &witness.prefix, to_20),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [200, 409], "got {first:?} / {second:?}");

    // The 409 body is the winner's size, and the stored state matches it.
    let stored = witness.db.tree_size(LOG_ORIGIN).await.unwrap().unwrap();
    let conflict_body = if first.0 == 409 { &first.1 } else { &second.1 };
    assert_eq!(
        String::from_utf8_lossy(conflict_body),
        stored.to_string(),
        "conflict body must carry the winner's size"
    );
    assert!(stored == 15 || stored == 20);

    witness.shutdown();
}

#[tokio::test]
async fn test_replay_of_winning_submission_is_idempotent() {
    let keys = log_keys();
    let tree = tree_with(15);
    let witness = start_witness(&[(LOG_ORIGIN, &keys.vkey, 10, tree.root_at(10))]).await;

    let body = witness_submission(
        10,
        &tree.consistency_proof(10, 15),
        &signed_checkpoint(&keys.skey, 15, tree.root_at(15)),
    );
    let (status, first) = post_submission(&witness.url, &witness.prefix, body).await;
    assert_eq!(status, 200);

    // Resubmit the same checkpoint with the now-current old size: same
    // deterministic cosignature, no state change.
    let replay = witness_submission(
        15,
        &[],
        &signed_checkpoint(&keys.skey, 15, tree.root_at(15)),
    );
    let (status, second) = post_submission(&witness.url, &witness.prefix, replay).await;
    assert_eq!(status, 200);
    assert_eq!(first, second);
    assert_eq!(witness.db.tree_size(LOG_ORIGIN).await.unwrap(), Some(15));

    witness.shutdown();
}

#[tokio::test]
async fn test_empty_proof_accepted_for_noop_resubmission() {
    let keys = log_keys();
    let tree = tree_with(10);
    let witness = start_witness(&[(LOG_ORIGIN, &keys.vkey, 10, tree.root())]).await;

    let body = witness_submission(10, &[], &signed_checkpoint(&keys.skey, 10, tree.root()));
    let (status, cosig) = post_submission(&witness.url, &witness.prefix, body).await;
    assert_eq!(status, 200);
    assert!(!cosig.is_empty());
    witness.shutdown();
}
