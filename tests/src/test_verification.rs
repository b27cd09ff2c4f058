use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use cli::{proof_hashes, BatchContent, MerkleTree};
use vote_ledger::merkle_helper::verify_helper;
use vote_ledger::VoteLeaf;
use vote_service::content::ContentStore;
use vote_service::database::ProofRecord;
use vote_service::error::{ReindexError, VerifyError};
use vote_service::indexer::reindex_batch;
use vote_service::ledger::{Ledger, LocalLedger};
use vote_service::{ProofVerifier, Verdict};

use crate::utils::{voter, voter_str, TestContext};

async fn committed_pair() -> TestContext {
    let ctx = TestContext::new().await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;
    ctx.commit("claim-1").await;
    ctx
}

async fn original_content(ctx: &TestContext) -> BatchContent {
    let batch = ctx.db.get_batch(0).await.unwrap().unwrap();
    let blob = ctx.store.fetch(&batch.content_id).await.unwrap();
    BatchContent::from_bytes(&blob).unwrap()
}

#[tokio::test]
async fn test_tampered_content_is_root_mismatch() {
    let ctx = committed_pair().await;

    let mut content = original_content(&ctx).await;
    content.valid_votes[1].choice_id = 9;
    ctx.store.tamper(content.to_bytes().unwrap()).await;

    let report = ctx.verifier.verify(voter(0xAA), 1).await.unwrap();
    assert_eq!(report.verdict, Verdict::RootMismatch);
    assert!(!report.is_valid);
    assert!(report.ledger_root.is_some());
    assert_ne!(report.ledger_root, report.rebuilt_root);
}

#[tokio::test]
async fn test_embedded_root_is_not_trusted() {
    let ctx = committed_pair().await;

    // Rewrite the blob consistently, including its own root field.
    let mut content = original_content(&ctx).await;
    content.valid_votes[1].choice_id = 9;
    content.merkle_root = content.rebuild_tree().unwrap().root();
    ctx.store.tamper(content.to_bytes().unwrap()).await;

    let report = ctx.verifier.verify(voter(0xAA), 1).await.unwrap();
    assert_eq!(report.verdict, Verdict::RootMismatch);
}

#[tokio::test]
async fn test_undecodable_content_is_corrupt() {
    let ctx = committed_pair().await;
    ctx.store.tamper(b"not a batch".to_vec()).await;

    let report = ctx.verifier.verify(voter(0xAA), 1).await.unwrap();
    assert_eq!(report.verdict, Verdict::ContentCorrupt);
}

#[tokio::test]
async fn test_unavailable_sources_are_errors_not_verdicts() {
    let ctx = committed_pair().await;

    ctx.store.unavailable.store(true, Ordering::SeqCst);
    assert!(matches!(
        ctx.verifier.verify(voter(0xAA), 1).await,
        Err(VerifyError::Unavailable(_))
    ));

    ctx.store.unavailable.store(false, Ordering::SeqCst);
    ctx.ledger.unavailable.store(true, Ordering::SeqCst);
    assert!(matches!(
        ctx.verifier.verify(voter(0xAA), 1).await,
        Err(VerifyError::Unavailable(_))
    ));

    ctx.ledger.unavailable.store(false, Ordering::SeqCst);
    let report = ctx.verifier.verify(voter(0xAA), 1).await.unwrap();
    assert!(report.is_valid);
}

#[tokio::test]
async fn test_root_missing_on_ledger_is_unknown_batch() {
    let ctx = committed_pair().await;
    let verifier = ProofVerifier::new(
        ctx.db.clone(),
        Arc::new(LocalLedger::new()),
        ctx.store.clone(),
        std::time::Duration::from_secs(1),
    );

    let report = verifier.verify(voter(0xAA), 1).await.unwrap();
    assert_eq!(report.verdict, Verdict::UnknownBatch);
    assert_eq!(report.batch_index, Some(0));
}

#[tokio::test]
async fn test_unknown_voter_has_no_proof() {
    let ctx = committed_pair().await;
    let report = ctx.verifier.verify(voter(0xEE), 1).await.unwrap();
    assert_eq!(report.verdict, Verdict::NoProof);
    assert_eq!(report.expected_leaf, VoteLeaf::new(voter(0xEE), 1).hash());
    assert!(report.content_id.is_none());
}

#[test]
fn test_proofs_accept_members_and_refuse_strangers() {
    let leaves: Vec<B256> = (1u8..=5)
        .map(|byte| VoteLeaf::new(voter(byte), byte as u64).hash())
        .collect();
    let tree = MerkleTree::new(&leaves).unwrap();
    let stranger = VoteLeaf::new(voter(0xEE), 1).hash();

    for (index, leaf) in leaves.iter().enumerate() {
        let proof = proof_hashes(&tree.get_proof(index).unwrap());
        assert!(verify_helper(*leaf, &proof, tree.root()).is_ok());
        assert!(verify_helper(stranger, &proof, tree.root()).is_err());
    }
}

#[tokio::test]
async fn test_reindex_regenerates_identical_proofs() {
    let ctx = TestContext::new().await;
    for (byte, choice) in [(0xAA, 1), (0xBB, 2), (0xCC, 3)] {
        ctx.add_vote(byte, choice).await;
    }
    ctx.commit("claim-1").await;

    let key = |records: Vec<ProofRecord>| {
        records
            .into_iter()
            .map(|r| (r.voter, r.choice_id, r.leaf, r.proof_path, r.content_id))
            .collect::<Vec<_>>()
    };
    let before = key(ctx.db.list_proofs_for_batch(0).await.unwrap());
    assert_eq!(before.len(), 3);

    let written = ctx.reindex(0).await.unwrap();
    assert_eq!(written, 3);
    let after = key(ctx.db.list_proofs_for_batch(0).await.unwrap());
    assert_eq!(before, after);

    assert!(matches!(
        ctx.reindex(7).await,
        Err(ReindexError::UnknownBatch(7))
    ));
}

#[tokio::test]
async fn test_reindex_refuses_tampered_content() {
    let ctx = committed_pair().await;
    let mut content = original_content(&ctx).await;
    content.valid_votes.pop();
    ctx.store.tamper(content.to_bytes().unwrap()).await;

    assert!(matches!(
        ctx.reindex(0).await,
        Err(ReindexError::RootMismatch { batch_index: 0, .. })
    ));
    // Existing records are left alone.
    assert!(ctx.db.get_proof_record(&voter_str(0xBB)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reindex_refuses_root_the_ledger_does_not_hold() {
    let ctx = committed_pair().await;
    let before = ctx.db.list_proofs_for_batch(0).await.unwrap();

    // Batch row and content agree with each other, not with the ledger.
    let mut content = original_content(&ctx).await;
    content.valid_votes.pop();
    let forged = content.rebuild_tree().unwrap().root();
    content.merkle_root = forged;
    ctx.store.tamper(content.to_bytes().unwrap()).await;
    sqlx::query("UPDATE batches SET merkle_root = ? WHERE batch_index = 0")
        .bind(forged.to_string())
        .execute(ctx.db.pool())
        .await
        .unwrap();

    match ctx.reindex(0).await {
        Err(ReindexError::StoredRootMismatch {
            batch_index: 0,
            stored,
            anchored,
        }) => {
            assert_eq!(stored, forged);
            assert_eq!(Some(anchored), ctx.ledger.get_root(0).await.unwrap());
        }
        other => panic!("expected a root mismatch, got {other:?}"),
    }
    assert_eq!(ctx.db.list_proofs_for_batch(0).await.unwrap(), before);
}

#[tokio::test]
async fn test_reindex_needs_the_ledger() {
    let ctx = committed_pair().await;
    ctx.ledger.unavailable.store(true, Ordering::SeqCst);
    assert!(matches!(ctx.reindex(0).await, Err(ReindexError::Ledger(_))));

    // A ledger that never anchored the batch.
    let fresh = LocalLedger::new();
    let result = reindex_batch(
        &ctx.db,
        &fresh,
        Duration::from_secs(1),
        ctx.store.as_ref(),
        0,
    )
    .await;
    assert!(matches!(result, Err(ReindexError::Unanchored(0))));
    assert_eq!(ctx.db.list_proofs_for_batch(0).await.unwrap().len(), 2);
}
