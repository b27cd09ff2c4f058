use std::sync::atomic::Ordering;

use vote_ledger::VoteLeaf;
use vote_service::database::{CommitStage, PendingVote};
use vote_service::ledger::Ledger;
use vote_service::recovery::recover;
use vote_service::{CommitOutcome, Verdict};

use crate::utils::{voter, voter_str, ScriptedLedger, TestContext};

#[tokio::test]
async fn test_two_votes_commit_as_batch_zero() {
    let ctx = TestContext::new().await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;

    let outcome = ctx.commit("claim-1").await;
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            claim_id: "claim-1".to_string(),
            batch_index: 0,
            accepted: 2,
            rejected: 0,
        }
    );

    let batch = ctx.db.get_batch(0).await.unwrap().unwrap();
    assert_eq!(batch.vote_count, 2);
    assert_eq!(ctx.ledger.get_root(0).await.unwrap(), Some(batch.merkle_root));
    assert_eq!(ctx.store.len().await, 1);

    for byte in [0xAA, 0xBB] {
        let proof = ctx.db.get_proof_record(&voter_str(byte)).await.unwrap().unwrap();
        assert_eq!(proof.batch_index, 0);
        assert_eq!(proof.content_id, batch.content_id);
        assert_eq!(proof.proof_path.len(), 1);
    }

    let report = ctx.verifier.verify(voter(0xAA), 1).await.unwrap();
    assert_eq!(report.verdict, Verdict::Valid);
    assert!(report.is_valid);
    assert_eq!(report.ledger_root, report.rebuilt_root);

    let report = ctx.verifier.verify(voter(0xAA), 2).await.unwrap();
    assert_eq!(report.verdict, Verdict::NotInBatch);
    assert!(!report.is_valid);

    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 0);
    assert!(!ctx.db.pipeline_status().await.unwrap().in_flight);
    let journal = ctx.db.get_commitment("claim-1").await.unwrap().unwrap();
    assert_eq!(journal.stage, CommitStage::Complete);
}

#[tokio::test]
async fn test_ledger_skip_leaves_single_leaf_batch() {
    let ctx = TestContext::with_ledger(ScriptedLedger::with_voted(&[voter(0xBB)])).await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;

    let outcome = ctx.commit("claim-1").await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed {
            batch_index: 0,
            accepted: 1,
            rejected: 1,
            ..
        }
    ));

    // A lone leaf is its own root.
    let batch = ctx.db.get_batch(0).await.unwrap().unwrap();
    assert_eq!(batch.merkle_root, VoteLeaf::new(voter(0xAA), 1).hash());

    let proof = ctx.db.get_proof_record(&voter_str(0xAA)).await.unwrap().unwrap();
    assert!(proof.proof_path.is_empty());
    assert!(ctx.db.get_proof_record(&voter_str(0xBB)).await.unwrap().is_none());

    let rejected = ctx.db.list_rejected("claim-1").await.unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].voter, voter_str(0xBB));
    assert_eq!(rejected[0].reason, "already voted");

    let report = ctx.verifier.verify(voter(0xBB), 2).await.unwrap();
    assert_eq!(report.verdict, Verdict::NoProof);
}

#[tokio::test]
async fn test_all_rejected_publishes_nothing() {
    let ctx =
        TestContext::with_ledger(ScriptedLedger::with_voted(&[voter(0xAA), voter(0xBB)])).await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;

    let outcome = ctx.commit("claim-1").await;
    assert_eq!(
        outcome,
        CommitOutcome::Empty {
            claim_id: "claim-1".to_string(),
            rejected: 2,
        }
    );

    assert!(ctx.db.list_batches().await.unwrap().is_empty());
    assert_eq!(ctx.store.len().await, 0);
    assert_eq!(ctx.ledger.batch_count().await.unwrap(), 0);
    assert_eq!(ctx.ledger.root_stores(), 0);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 0);
    assert_eq!(ctx.db.list_rejected("claim-1").await.unwrap().len(), 2);
    assert!(!ctx.db.pipeline_status().await.unwrap().in_flight);
}

#[tokio::test]
async fn test_malformed_vote_is_rejected_without_submission() {
    let ctx = TestContext::new().await;
    ctx.add_vote(0xAA, 1).await;
    ctx.db
        .insert_pending_vote(&PendingVote {
            voter: "not-an-address".to_string(),
            choice_id: 3,
            signature: "0x00".to_string(),
        })
        .await
        .unwrap();

    let outcome = ctx.commit("claim-1").await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed {
            accepted: 1,
            rejected: 1,
            ..
        }
    ));

    let rejected = ctx.db.list_rejected("claim-1").await.unwrap();
    assert_eq!(rejected[0].voter, "not-an-address");
    assert!(rejected[0].reason.starts_with("malformed:"));

    let contract = ctx.ledger.contract().await;
    assert_eq!(contract.receipts.len(), 1);
    assert_eq!(contract.receipts[0].accepted.len(), 1);
}

#[tokio::test]
async fn test_failed_submission_releases_claim() {
    let ledger = ScriptedLedger::new();
    ledger.fail_submits.store(1, Ordering::SeqCst);
    let ctx = TestContext::with_ledger(ledger).await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;

    let outcome = ctx.commit("claim-1").await;
    assert!(matches!(outcome, CommitOutcome::Released { .. }), "{outcome:?}");

    let journal = ctx.db.get_commitment("claim-1").await.unwrap().unwrap();
    assert_eq!(journal.stage, CommitStage::Released);
    assert!(journal.error.is_some());
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 2);
    assert!(!ctx.db.pipeline_status().await.unwrap().in_flight);
    assert!(ctx.db.list_batches().await.unwrap().is_empty());

    // The released votes go out again under a fresh claim.
    let outcome = ctx.commit("claim-2").await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed {
            batch_index: 0,
            accepted: 2,
            ..
        }
    ));
    assert_eq!(ctx.ledger.submits(), 2);
}

#[tokio::test]
async fn test_landed_submission_is_not_resubmitted() {
    let ledger = ScriptedLedger::new();
    ledger.land_then_fail.store(true, Ordering::SeqCst);
    let ctx = TestContext::with_ledger(ledger).await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;

    let outcome = ctx.commit("claim-1").await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed { accepted: 2, .. }
    ));
    assert_eq!(ctx.ledger.submits(), 1);
    assert_eq!(ctx.ledger.contract().await.receipts.len(), 1);
}

#[tokio::test]
async fn test_root_failure_stalls_then_resumes() {
    let ledger = ScriptedLedger::new();
    ledger.fail_store_roots.store(1, Ordering::SeqCst);
    let ctx = TestContext::with_ledger(ledger).await;
    ctx.add_vote(0xAA, 1).await;

    let outcome = ctx.commit("claim-1").await;
    match &outcome {
        CommitOutcome::Stalled { stage, .. } => assert_eq!(*stage, CommitStage::Rooting),
        other => panic!("expected a stall, got {other:?}"),
    }

    // Past confirmation the votes stay claimed and the pipeline stays busy.
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 0);
    assert!(ctx.db.pipeline_status().await.unwrap().in_flight);
    ctx.add_vote(0xCC, 3).await;
    assert!(ctx.claim("claim-2").await.is_none());

    let report = recover(&ctx.committer).await.unwrap();
    assert_eq!(report.committed, 1);
    assert_eq!(report.stalled, 0);
    assert_eq!(ctx.db.get_batch(0).await.unwrap().unwrap().vote_count, 1);
    assert_eq!(ctx.ledger.submits(), 1);
    assert_eq!(ctx.ledger.root_stores(), 2);
    assert_eq!(ctx.ledger.batch_count().await.unwrap(), 1);
    assert!(!ctx.db.pipeline_status().await.unwrap().in_flight);
}

#[tokio::test]
async fn test_votes_arriving_in_flight_wait_for_next_batch() {
    let ctx = TestContext::with_ledger(ScriptedLedger::gated()).await;
    ctx.add_vote(0xAA, 1).await;
    let claim = ctx.claim("claim-1").await.unwrap();

    let committer = ctx.committer.clone();
    let first = tokio::spawn(async move { committer.commit_claim(claim).await });
    ctx.ledger.entered.notified().await;

    ctx.add_vote(0xCC, 3).await;
    assert!(ctx.claim("claim-2").await.is_none());

    ctx.ledger.open_gate();
    let outcome = first.await.unwrap();
    assert!(matches!(
        outcome,
        CommitOutcome::Committed {
            batch_index: 0,
            accepted: 1,
            ..
        }
    ));
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 1);

    let claim = ctx.claim("claim-2").await.unwrap();
    assert_eq!(claim.votes.len(), 1);
    assert_eq!(claim.votes[0].voter, voter_str(0xCC));

    ctx.ledger.open_gate();
    let outcome = ctx.committer.commit_claim(claim).await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed { batch_index: 1, .. }
    ));

    let indices: Vec<u64> = ctx
        .db
        .list_batches()
        .await
        .unwrap()
        .iter()
        .map(|batch| batch.batch_index)
        .collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn test_committed_voter_cannot_queue_again() {
    let ctx = TestContext::new().await;
    ctx.add_vote(0xAA, 1).await;
    ctx.commit("claim-1").await;

    let outcome = ctx
        .db
        .insert_pending_vote(&crate::utils::pending(0xAA, 2))
        .await
        .unwrap();
    assert_eq!(outcome, vote_service::database::InsertOutcome::AlreadyVoted);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 0);
}
