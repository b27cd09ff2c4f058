use std::sync::atomic::Ordering;
use std::time::Duration;

use vote_ledger::{VoteSubmission, MAX_BATCH_VOTES};
use vote_service::anchor;
use vote_service::database::{CommitStage, CommitmentUpdate};
use vote_service::ledger::{batch_key, Ledger};
use vote_service::pipeline::{normalize_votes, partition};
use vote_service::recovery::{recover, RecoveryReport};
use vote_service::{BatchTrigger, CommitOutcome, Verdict};

use crate::utils::{numbered_pending, numbered_voter, voter, ScriptedLedger, TestContext};

const CLAIM: &str = "claim-1";

/// Claims two votes and returns their ledger submissions.
async fn claimed_pair(ctx: &TestContext) -> Vec<VoteSubmission> {
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;
    let claim = ctx.claim(CLAIM).await.unwrap();
    normalize_votes(CLAIM, &claim.votes).0
}

async fn advance(ctx: &TestContext, stage: CommitStage, update: CommitmentUpdate) {
    ctx.db.advance_commitment(CLAIM, stage, update).await.unwrap();
}

/// Drives a claim by hand up to `Submitted`, as if the process died there.
async fn submitted_pair(ctx: &TestContext) -> Vec<VoteSubmission> {
    let subs = claimed_pair(ctx).await;
    advance(ctx, CommitStage::Submitting, Default::default()).await;
    let receipt = ctx.ledger.submit_batch(batch_key(CLAIM), &subs).await.unwrap();
    advance(
        ctx,
        CommitStage::Submitted,
        CommitmentUpdate {
            receipt: Some(receipt.clone()),
            ..Default::default()
        },
    )
    .await;
    partition(CLAIM, &subs, &receipt).unwrap().valid
}

async fn assert_recovered_batch(ctx: &TestContext, report: &RecoveryReport) {
    assert_eq!(report.committed, 1, "{report:?}");
    assert_eq!(ctx.ledger.submits(), 1);
    assert_eq!(ctx.ledger.batch_count().await.unwrap(), 1);
    assert_eq!(ctx.db.list_batches().await.unwrap().len(), 1);
    assert_eq!(
        ctx.db.get_commitment(CLAIM).await.unwrap().unwrap().stage,
        CommitStage::Complete
    );
    assert!(!ctx.db.pipeline_status().await.unwrap().in_flight);

    let report = ctx.verifier.verify(voter(0xBB), 2).await.unwrap();
    assert_eq!(report.verdict, Verdict::Valid);
}

#[tokio::test]
async fn test_recover_releases_bare_claim() {
    let ctx = TestContext::new().await;
    claimed_pair(&ctx).await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 2);
    assert_eq!(ctx.ledger.submits(), 0);
    assert!(!ctx.db.pipeline_status().await.unwrap().in_flight);
}

#[tokio::test]
async fn test_recover_releases_submission_that_never_landed() {
    let ctx = TestContext::new().await;
    claimed_pair(&ctx).await;
    advance(&ctx, CommitStage::Submitting, Default::default()).await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 2);
    assert_eq!(ctx.ledger.submits(), 0);
}

#[tokio::test]
async fn test_recover_keeps_claim_when_ledger_is_unreachable() {
    let ctx = TestContext::new().await;
    claimed_pair(&ctx).await;
    advance(&ctx, CommitStage::Submitting, Default::default()).await;
    ctx.ledger.unavailable.store(true, Ordering::SeqCst);

    let report = recover(&ctx.committer).await.unwrap();
    assert_eq!(report.stalled, 1);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 0);
    assert!(ctx.db.pipeline_status().await.unwrap().in_flight);

    let journal = ctx.db.get_commitment(CLAIM).await.unwrap().unwrap();
    assert_eq!(journal.stage, CommitStage::Submitting);
    assert!(journal.error.is_some());
}

#[tokio::test]
async fn test_recover_finds_landed_submission() {
    let ctx = TestContext::new().await;
    let subs = claimed_pair(&ctx).await;
    advance(&ctx, CommitStage::Submitting, Default::default()).await;
    ctx.ledger.submit_batch(batch_key(CLAIM), &subs).await.unwrap();

    let report = recover(&ctx.committer).await.unwrap();
    assert_recovered_batch(&ctx, &report).await;
}

#[tokio::test]
async fn test_recover_from_submitted() {
    let ctx = TestContext::new().await;
    submitted_pair(&ctx).await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_recovered_batch(&ctx, &report).await;
    assert_eq!(ctx.ledger.root_stores(), 1);
}

#[tokio::test]
async fn test_recover_reuses_landed_root() {
    let ctx = TestContext::new().await;
    let valid = submitted_pair(&ctx).await;
    let (content, _) = anchor::build_content(&valid).unwrap();
    ctx.ledger.store_root(content.merkle_root).await.unwrap();
    advance(
        &ctx,
        CommitStage::Rooting,
        CommitmentUpdate {
            merkle_root: Some(content.merkle_root),
            ..Default::default()
        },
    )
    .await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_recovered_batch(&ctx, &report).await;
    assert_eq!(ctx.ledger.root_stores(), 1);
}

#[tokio::test]
async fn test_recover_stores_root_that_never_landed() {
    let ctx = TestContext::new().await;
    let valid = submitted_pair(&ctx).await;
    let (content, _) = anchor::build_content(&valid).unwrap();
    advance(
        &ctx,
        CommitStage::Rooting,
        CommitmentUpdate {
            merkle_root: Some(content.merkle_root),
            ..Default::default()
        },
    )
    .await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_recovered_batch(&ctx, &report).await;
    assert_eq!(ctx.ledger.root_stores(), 1);
}

#[tokio::test]
async fn test_recover_from_rooted() {
    let ctx = TestContext::new().await;
    let valid = submitted_pair(&ctx).await;
    let (content, _) = anchor::build_content(&valid).unwrap();
    let batch_index = ctx.ledger.store_root(content.merkle_root).await.unwrap();
    advance(
        &ctx,
        CommitStage::Rooted,
        CommitmentUpdate {
            batch_index: Some(batch_index),
            merkle_root: Some(content.merkle_root),
            ..Default::default()
        },
    )
    .await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_recovered_batch(&ctx, &report).await;
    assert_eq!(ctx.store.publishes(), 1);
}

#[tokio::test]
async fn test_recover_from_published() {
    let ctx = TestContext::new().await;
    let valid = submitted_pair(&ctx).await;
    let (content, _) = anchor::build_content(&valid).unwrap();
    let batch_index = ctx.ledger.store_root(content.merkle_root).await.unwrap();
    let content_id = anchor::publish(ctx.store.as_ref(), &content).await.unwrap();
    advance(
        &ctx,
        CommitStage::Rooted,
        CommitmentUpdate {
            batch_index: Some(batch_index),
            merkle_root: Some(content.merkle_root),
            ..Default::default()
        },
    )
    .await;
    advance(
        &ctx,
        CommitStage::Published,
        CommitmentUpdate {
            content_id: Some(content_id.clone()),
            ..Default::default()
        },
    )
    .await;

    let report = recover(&ctx.committer).await.unwrap();
    assert_recovered_batch(&ctx, &report).await;
    assert_eq!(ctx.store.publishes(), 1);
    assert_eq!(ctx.db.get_batch(0).await.unwrap().unwrap().content_id, content_id);
}

#[tokio::test]
async fn test_recover_frees_orphaned_votes() {
    let ctx = TestContext::new().await;
    ctx.add_vote(0xAA, 1).await;
    sqlx::query("UPDATE pending_votes SET claim_id = 'ghost'")
        .execute(ctx.db.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE pipeline_state SET in_flight = 1, claim_id = 'ghost' WHERE id = 1")
        .execute(ctx.db.pool())
        .await
        .unwrap();

    let report = recover(&ctx.committer).await.unwrap();
    assert_eq!(report.orphaned_votes, 1);
    assert!(report.cleared_in_flight);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 1);
}

async fn next_outcome(
    outcomes: &mut tokio::sync::broadcast::Receiver<CommitOutcome>,
) -> CommitOutcome {
    tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .expect("no commitment finished in time")
        .unwrap()
}

#[tokio::test]
async fn test_trigger_commits_at_threshold() {
    let ctx = TestContext::new().await;
    let (handle, task) =
        BatchTrigger::spawn(ctx.committer.clone(), 2, None, Duration::from_millis(10));
    let mut outcomes = handle.subscribe();

    ctx.add_vote(0xAA, 1).await;
    handle.notify_vote();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ctx.db.list_batches().await.unwrap().is_empty());
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 1);

    ctx.add_vote(0xBB, 2).await;
    handle.notify_vote();
    let outcome = next_outcome(&mut outcomes).await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed { accepted: 2, .. }
    ));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_trigger_picks_up_leftover_pool() {
    let ctx = TestContext::new().await;
    ctx.add_vote(0xAA, 1).await;
    ctx.add_vote(0xBB, 2).await;

    let (handle, task) =
        BatchTrigger::spawn(ctx.committer.clone(), 2, None, Duration::from_millis(10));
    let mut outcomes = handle.subscribe();

    let outcome = next_outcome(&mut outcomes).await;
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_trigger_interval_commits_below_threshold() {
    let ctx = TestContext::new().await;
    let (handle, task) = BatchTrigger::spawn(
        ctx.committer.clone(),
        100,
        Some(Duration::from_millis(50)),
        Duration::from_millis(10),
    );
    let mut outcomes = handle.subscribe();

    ctx.add_vote(0xAA, 1).await;
    handle.notify_vote();

    let outcome = next_outcome(&mut outcomes).await;
    assert!(matches!(
        outcome,
        CommitOutcome::Committed { accepted: 1, .. }
    ));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_trigger_retries_stalled_commitment() {
    let ledger = ScriptedLedger::new();
    ledger.fail_store_roots.store(1, Ordering::SeqCst);
    let ctx = TestContext::with_ledger(ledger).await;
    let (handle, task) =
        BatchTrigger::spawn(ctx.committer.clone(), 1, None, Duration::from_millis(10));
    let mut outcomes = handle.subscribe();

    ctx.add_vote(0xAA, 1).await;
    handle.notify_vote();

    let first = next_outcome(&mut outcomes).await;
    assert!(first.is_stalled(), "{first:?}");
    let second = next_outcome(&mut outcomes).await;
    assert_eq!(second.claim_id(), first.claim_id());
    assert!(matches!(second, CommitOutcome::Committed { batch_index: 0, .. }));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_trigger_backs_off_while_ledger_reverts() {
    let ledger = ScriptedLedger::new();
    ledger.revert_submits.store(true, Ordering::SeqCst);
    let ctx = TestContext::with_ledger(ledger).await;
    ctx.add_vote(0xAA, 1).await;

    let (handle, task) =
        BatchTrigger::spawn(ctx.committer.clone(), 1, None, Duration::from_millis(50));
    let mut outcomes = handle.subscribe();

    let first = next_outcome(&mut outcomes).await;
    assert!(matches!(first, CommitOutcome::Released { .. }), "{first:?}");

    // New votes do not cut the wait short.
    for _ in 0..20 {
        handle.notify_vote();
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let submits = ctx.ledger.submits();
    assert!((2..=6).contains(&submits), "{submits} submissions");
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 1);

    ctx.ledger.revert_submits.store(false, Ordering::SeqCst);
    loop {
        match next_outcome(&mut outcomes).await {
            CommitOutcome::Released { .. } => continue,
            outcome => {
                assert!(
                    matches!(outcome, CommitOutcome::Committed { accepted: 1, .. }),
                    "{outcome:?}"
                );
                break;
            }
        }
    }
    assert!(ctx.ledger.contract().await.has_voted(&voter(0xAA)));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_trigger_splits_pool_larger_than_ledger_batch() {
    let ctx = TestContext::new().await;
    let pool = MAX_BATCH_VOTES as u32 + 1;
    for n in 0..pool {
        ctx.db
            .insert_pending_vote(&numbered_pending(n, 1))
            .await
            .unwrap();
    }

    let (handle, task) =
        BatchTrigger::spawn(ctx.committer.clone(), 1, None, Duration::from_millis(10));
    let mut outcomes = handle.subscribe();

    let mut committed = Vec::new();
    while committed.len() < 2 {
        let outcome = tokio::time::timeout(Duration::from_secs(30), outcomes.recv())
            .await
            .expect("no commitment finished in time")
            .unwrap();
        match outcome {
            CommitOutcome::Committed { accepted, .. } => committed.push(accepted),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(committed, vec![MAX_BATCH_VOTES, 1]);

    let counts: Vec<u64> = ctx
        .db
        .list_batches()
        .await
        .unwrap()
        .iter()
        .map(|batch| batch.vote_count)
        .collect();
    assert_eq!(counts, vec![MAX_BATCH_VOTES as u64, 1]);
    assert_eq!(ctx.db.count_unclaimed().await.unwrap(), 0);
    let last = numbered_voter(pool - 1).to_checksum(None);
    assert!(ctx.db.get_proof_record(&last).await.unwrap().is_some());

    handle.shutdown().await;
    task.await.unwrap();
}
