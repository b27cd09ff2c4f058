//! Submission pipeline
//!
//! Drives one claimed batch from the ledger submission through anchoring to
//! stored proof records. Each step is journaled before its side effect, so an
//! interrupted commitment can be resumed from its last stage by [`Committer::resume`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use cli::utils::{parse_address, parse_signature};
use tracing::{debug, error, info, warn};
use vote_ledger::{BatchReceipt, VoteSubmission};

use crate::anchor;
use crate::config::PipelineSettings;
use crate::content::ContentStore;
use crate::database::{
    BatchRecord, Claim, CommitStage, CommitmentRecord, CommitmentUpdate, Database, FinalizeBatch,
    PendingVote, RejectedVoteRecord,
};
use crate::error::{CommitError, LedgerError};
use crate::indexer::{build_proof_records, store_with_retries};
use crate::ledger::{batch_key, with_timeout, Ledger};
use crate::metrics::{self, CommitKind};
use crate::utils::now_rfc3339;

/// Reason recorded for a vote the ledger receipt says nothing about.
pub const NO_LEDGER_OUTCOME: &str = "no ledger outcome";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Batch anchored and proofs stored.
    Committed {
        claim_id: String,
        batch_index: u64,
        accepted: usize,
        rejected: usize,
    },
    /// Nothing was accepted; the claimed votes were cleared without a batch.
    Empty { claim_id: String, rejected: usize },
    /// Claimed votes went back to the pool.
    Released { claim_id: String, reason: String },
    /// Stopped after the ledger confirmed; retried later from `stage`.
    Stalled {
        claim_id: String,
        stage: CommitStage,
        reason: String,
    },
}

impl CommitOutcome {
    pub fn claim_id(&self) -> &str {
        match self {
            CommitOutcome::Committed { claim_id, .. }
            | CommitOutcome::Empty { claim_id, .. }
            | CommitOutcome::Released { claim_id, .. }
            | CommitOutcome::Stalled { claim_id, .. } => claim_id,
        }
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, CommitOutcome::Stalled { .. })
    }
}

/// Valid and rejected halves of a submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub valid: Vec<VoteSubmission>,
    pub rejected: Vec<RejectedVoteRecord>,
}

/// Splits claimed votes into well-formed submissions and `malformed` rejections.
pub fn normalize_votes(
    claim_id: &str,
    votes: &[PendingVote],
) -> (Vec<VoteSubmission>, Vec<RejectedVoteRecord>) {
    let mut submissions = Vec::with_capacity(votes.len());
    let mut malformed = Vec::new();

    for vote in votes {
        let parsed = parse_address(&vote.voter).and_then(|voter| {
            parse_signature(&vote.signature).map(|signature| VoteSubmission {
                voter,
                choice_id: vote.choice_id,
                signature,
            })
        });
        match parsed {
            Ok(submission) => submissions.push(submission),
            Err(reason) => {
                debug!("Dropping malformed vote from {}: {}", vote.voter, reason);
                malformed.push(RejectedVoteRecord {
                    claim_id: claim_id.to_string(),
                    voter: vote.voter.clone(),
                    reason: format!("malformed: {reason}"),
                })
            }
        }
    }

    (submissions, malformed)
}

/// Partitions submitted votes using only the ledger's per-vote events.
///
/// The valid set keeps submission order. An accepted event that matches no
/// submitted vote means the receipt is not for this batch.
pub fn partition(
    claim_id: &str,
    submissions: &[VoteSubmission],
    receipt: &BatchReceipt,
) -> Result<Partition, CommitError> {
    let mut accepted: HashSet<(Address, u64)> = receipt
        .accepted
        .iter()
        .map(|event| (event.voter, event.choice_id))
        .collect();
    let skipped: HashMap<Address, &str> = receipt
        .skipped
        .iter()
        .map(|event| (event.voter, event.reason.as_str()))
        .collect();

    let mut out = Partition::default();
    for vote in submissions {
        if accepted.remove(&(vote.voter, vote.choice_id)) {
            out.valid.push(vote.clone());
            continue;
        }
        let reason = skipped.get(&vote.voter).copied().unwrap_or(NO_LEDGER_OUTCOME);
        out.rejected.push(RejectedVoteRecord {
            claim_id: claim_id.to_string(),
            voter: vote.voter.to_checksum(None),
            reason: reason.to_string(),
        });
    }

    if let Some((voter, choice_id)) = accepted.into_iter().next() {
        return Err(CommitError::Integrity(format!(
            "ledger accepted ({voter}, {choice_id}) which was not submitted"
        )));
    }
    Ok(out)
}

/// Runs commitments against one ledger and one content store.
pub struct Committer {
    db: Database,
    ledger: Arc<dyn Ledger>,
    content: Arc<dyn ContentStore>,
    settings: PipelineSettings,
}

impl Committer {
    pub fn new(
        db: Database,
        ledger: Arc<dyn Ledger>,
        content: Arc<dyn ContentStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            db,
            ledger,
            content,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Commits a freshly claimed pool.
    pub async fn commit_claim(&self, claim: Claim) -> CommitOutcome {
        info!("Committing {} votes under {}", claim.votes.len(), claim.claim_id);
        self.resume(CommitmentRecord {
            claim_id: claim.claim_id,
            stage: CommitStage::Claimed,
            votes: claim.votes,
            receipt: None,
            batch_index: None,
            merkle_root: None,
            content_id: None,
            error: None,
            updated_at: now_rfc3339(),
        })
        .await
    }

    /// Continues a commitment from its journaled stage.
    pub async fn resume(&self, record: CommitmentRecord) -> CommitOutcome {
        let claim_id = record.claim_id.clone();
        let mut stage = record.stage;

        let outcome = match self.run(&record, &mut stage).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(&claim_id, stage, err).await,
        };

        metrics::record_commit(match &outcome {
            CommitOutcome::Committed { .. } => CommitKind::Committed,
            CommitOutcome::Empty { .. } => CommitKind::Empty,
            CommitOutcome::Released { .. } => CommitKind::Released,
            CommitOutcome::Stalled { .. } => CommitKind::Stalled,
        });
        outcome
    }

    async fn fail(&self, claim_id: &str, stage: CommitStage, err: CommitError) -> CommitOutcome {
        let reason = err.to_string();

        if stage.before_confirmation() && err.is_definitive_rejection() {
            warn!("Releasing {} at stage {}: {}", claim_id, stage, reason);
            return match self.db.release_claim(claim_id, &reason).await {
                Ok(released) => {
                    info!("Returned {} votes of {} to the pool", released, claim_id);
                    CommitOutcome::Released {
                        claim_id: claim_id.to_string(),
                        reason,
                    }
                }
                Err(e) => {
                    error!("Failed to release {}: {}", claim_id, e);
                    CommitOutcome::Stalled {
                        claim_id: claim_id.to_string(),
                        stage,
                        reason: format!("{reason}; release failed: {e}"),
                    }
                }
            };
        }

        warn!("Commitment {} stalled at stage {}: {}", claim_id, stage, reason);
        if let Err(e) = self.db.record_commitment_error(claim_id, &reason).await {
            error!("Failed to journal error for {}: {}", claim_id, e);
        }
        CommitOutcome::Stalled {
            claim_id: claim_id.to_string(),
            stage,
            reason,
        }
    }

    async fn advance(
        &self,
        claim_id: &str,
        stage: &mut CommitStage,
        next: CommitStage,
        update: CommitmentUpdate,
    ) -> Result<(), CommitError> {
        self.db.advance_commitment(claim_id, next, update).await?;
        *stage = next;
        Ok(())
    }

    async fn run(
        &self,
        record: &CommitmentRecord,
        stage: &mut CommitStage,
    ) -> Result<CommitOutcome, CommitError> {
        let claim_id = record.claim_id.as_str();
        let key = batch_key(claim_id);
        let (submissions, malformed) = normalize_votes(claim_id, &record.votes);

        let receipt = match *stage {
            CommitStage::Claimed => {
                if submissions.is_empty() {
                    info!("All {} votes of {} are malformed", malformed.len(), claim_id);
                    return self.finish_empty(claim_id, malformed, 0).await;
                }
                self.advance(claim_id, stage, CommitStage::Submitting, Default::default())
                    .await?;
                self.submit_confirmed(key, &submissions).await?
            }
            CommitStage::Submitting => self.await_confirmation(key).await?,
            _ => record.receipt.clone().ok_or_else(|| {
                CommitError::Integrity(format!("journal of {claim_id} has no receipt"))
            })?,
        };
        let Partition { valid, rejected } = partition(claim_id, &submissions, &receipt)?;

        if stage.before_confirmation() {
            self.advance(
                claim_id,
                stage,
                CommitStage::Submitted,
                CommitmentUpdate {
                    receipt: Some(receipt.clone()),
                    ..Default::default()
                },
            )
            .await?;
        }

        let ledger_rejected = rejected.len();
        let all_rejected: Vec<RejectedVoteRecord> =
            malformed.iter().cloned().chain(rejected).collect();

        if valid.is_empty() {
            info!("Ledger accepted none of the votes of {}", claim_id);
            return self
                .finish_empty(claim_id, all_rejected, ledger_rejected)
                .await;
        }

        let (content, tree) = anchor::build_content(&valid)?;
        let merkle_root = content.merkle_root;
        if let Some(journaled) = record.merkle_root {
            if journaled != merkle_root {
                return Err(CommitError::Integrity(format!(
                    "rebuilt root {merkle_root} differs from journaled root {journaled}"
                )));
            }
        }

        let batch_index = self.anchor_root(record, stage, merkle_root).await?;

        let content_id = match (*stage, &record.content_id) {
            (CommitStage::Published, Some(content_id)) => content_id.clone(),
            _ => {
                let content_id = anchor::publish(self.content.as_ref(), &content).await?;
                self.advance(
                    claim_id,
                    stage,
                    CommitStage::Published,
                    CommitmentUpdate {
                        content_id: Some(content_id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                content_id
            }
        };

        let proofs = build_proof_records(&content, &tree, batch_index, &content_id)?;
        let finalize = FinalizeBatch {
            claim_id: claim_id.to_string(),
            batch: Some(BatchRecord {
                batch_index,
                merkle_root,
                content_id,
                vote_count: valid.len() as u64,
                claim_id: claim_id.to_string(),
                created_at: now_rfc3339(),
            }),
            proofs,
            rejected: all_rejected,
        };
        store_with_retries(
            &self.db,
            &finalize,
            self.settings.proof_store_retries,
            self.settings.retry_backoff,
        )
        .await?;

        metrics::record_partition(valid.len(), ledger_rejected, malformed.len());
        info!(
            "Committed batch {} for {}: {} accepted, {} rejected",
            batch_index,
            claim_id,
            valid.len(),
            finalize.rejected.len()
        );
        Ok(CommitOutcome::Committed {
            claim_id: claim_id.to_string(),
            batch_index,
            accepted: valid.len(),
            rejected: finalize.rejected.len(),
        })
    }

    /// Gets a ledger batch index for `merkle_root`, storing it if needed.
    async fn anchor_root(
        &self,
        record: &CommitmentRecord,
        stage: &mut CommitStage,
        merkle_root: B256,
    ) -> Result<u64, CommitError> {
        let claim_id = record.claim_id.as_str();
        let timeout = self.settings.ledger_timeout;

        if *stage >= CommitStage::Rooted {
            return record.batch_index.ok_or_else(|| {
                CommitError::Integrity(format!("journal of {claim_id} has no batch index"))
            });
        }

        let batch_index = if *stage == CommitStage::Rooting {
            // The root call may have landed before the interruption.
            anchor::reconcile_root(self.ledger.as_ref(), timeout, merkle_root).await?
        } else {
            self.advance(
                claim_id,
                stage,
                CommitStage::Rooting,
                CommitmentUpdate {
                    merkle_root: Some(merkle_root),
                    ..Default::default()
                },
            )
            .await?;
            anchor::store_root(self.ledger.as_ref(), timeout, merkle_root).await?
        };

        self.advance(
            claim_id,
            stage,
            CommitStage::Rooted,
            CommitmentUpdate {
                batch_index: Some(batch_index),
                merkle_root: Some(merkle_root),
                ..Default::default()
            },
        )
        .await?;
        Ok(batch_index)
    }

    /// Submits the batch and insists on a confirmed receipt.
    async fn submit_confirmed(
        &self,
        key: B256,
        submissions: &[VoteSubmission],
    ) -> Result<BatchReceipt, CommitError> {
        let submitted = with_timeout(
            self.settings.ledger_timeout,
            self.ledger.submit_batch(key, submissions),
        )
        .await;

        match submitted {
            Ok(receipt) if receipt.confirmed => return Ok(receipt),
            Ok(_) => debug!("Submission {} not yet confirmed", key),
            Err(LedgerError::Reverted(reason)) => {
                return Err(LedgerError::Reverted(reason).into())
            }
            Err(e) => warn!("Submission {} failed: {}; checking whether it landed", key, e),
        }

        self.await_confirmation(key).await
    }

    /// Polls for a confirmed receipt. `NotConfirmed` means the ledger answered
    /// every poll without one; a ledger error on the last poll is returned as is.
    async fn await_confirmation(&self, key: B256) -> Result<BatchReceipt, CommitError> {
        let mut last_error = None;

        for poll in 0..self.settings.confirmation_polls {
            if poll > 0 {
                tokio::time::sleep(self.settings.confirmation_poll_interval).await;
            }
            match with_timeout(self.settings.ledger_timeout, self.ledger.receipt(key)).await {
                Ok(Some(receipt)) if receipt.confirmed => {
                    info!("Submission {} confirmed on poll {}", key, poll + 1);
                    return Ok(receipt);
                }
                Ok(_) => last_error = None,
                Err(e) => {
                    debug!("Receipt poll {} for {} failed: {}", poll + 1, key, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(CommitError::NotConfirmed),
        }
    }

    async fn finish_empty(
        &self,
        claim_id: &str,
        rejected: Vec<RejectedVoteRecord>,
        ledger_rejected: usize,
    ) -> Result<CommitOutcome, CommitError> {
        let finalize = FinalizeBatch {
            claim_id: claim_id.to_string(),
            batch: None,
            proofs: Vec::new(),
            rejected,
        };
        store_with_retries(
            &self.db,
            &finalize,
            self.settings.proof_store_retries,
            self.settings.retry_backoff,
        )
        .await?;

        metrics::record_partition(0, ledger_rejected, finalize.rejected.len() - ledger_rejected);
        Ok(CommitOutcome::Empty {
            claim_id: claim_id.to_string(),
            rejected: finalize.rejected.len(),
        })
    }
}
