//! Proof store: per-voter proof records of committed batches

use std::time::Duration;

use anyhow::Result;
use cli::{proof_hashes, BatchContent, MerkleTree};
use tracing::{debug, info, warn};
use vote_ledger::merkle_helper::verify_helper;

use crate::content::ContentStore;
use crate::database::{Database, FinalizeBatch, ProofRecord};
use crate::error::{CommitError, ReindexError};
use crate::ledger::{with_timeout, Ledger};
use crate::utils::{backoff, now_rfc3339};

/// Derives one proof record per valid vote of an anchored batch.
///
/// Every path is checked against the tree root before it is returned, so a
/// record that would not verify is never written.
pub fn build_proof_records(
    content: &BatchContent,
    tree: &MerkleTree,
    batch_index: u64,
    content_id: &str,
) -> Result<Vec<ProofRecord>, CommitError> {
    if tree.leaf_count() != content.valid_votes.len() {
        return Err(CommitError::Integrity(format!(
            "tree has {} leaves for {} votes",
            tree.leaf_count(),
            content.valid_votes.len()
        )));
    }

    let updated_at = now_rfc3339();
    let root = tree.root();
    content
        .valid_votes
        .iter()
        .zip(tree.leaves())
        .enumerate()
        .map(|(index, (vote, leaf))| {
            let proof_path = tree
                .get_proof(index)
                .ok_or_else(|| CommitError::Integrity(format!("no proof for leaf {index}")))?;
            verify_helper(*leaf, &proof_hashes(&proof_path), root).map_err(|e| {
                CommitError::Integrity(format!("proof for {} does not verify: {}", vote.voter, e))
            })?;

            Ok(ProofRecord {
                voter: vote.voter.clone(),
                choice_id: vote.choice_id,
                batch_index,
                content_id: content_id.to_string(),
                leaf: *leaf,
                proof_path,
                updated_at: updated_at.clone(),
            })
        })
        .collect()
}

/// Writes a finished commitment, retrying the whole transaction with
/// exponential backoff. Returns the last error once `retries` is exhausted.
pub async fn store_with_retries(
    db: &Database,
    finalize: &FinalizeBatch,
    retries: u32,
    base_delay: Duration,
) -> Result<()> {
    let attempts = retries.max(1);
    let mut attempt = 0;
    loop {
        match db.finalize_commitment(finalize).await {
            Ok(()) => {
                debug!(
                    "Stored {} proof records for {}",
                    finalize.proofs.len(),
                    finalize.claim_id
                );
                return Ok(());
            }
            Err(e) if attempt + 1 < attempts => {
                let delay = backoff(base_delay, attempt);
                warn!(
                    "Proof store write for {} failed (attempt {}/{}): {}; retrying in {:?}",
                    finalize.claim_id,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Regenerates every proof record of a committed batch from its anchored
/// content alone. Returns the number of records written.
///
/// The rebuilt tree must match the root the ledger holds for the batch, and
/// so must the batch row; nothing is written otherwise.
pub async fn reindex_batch(
    db: &Database,
    ledger: &dyn Ledger,
    ledger_timeout: Duration,
    store: &dyn ContentStore,
    batch_index: u64,
) -> Result<usize, ReindexError> {
    let batch = db
        .get_batch(batch_index)
        .await?
        .ok_or(ReindexError::UnknownBatch(batch_index))?;

    let anchored = with_timeout(ledger_timeout, ledger.get_root(batch_index))
        .await?
        .ok_or(ReindexError::Unanchored(batch_index))?;
    if batch.merkle_root != anchored {
        return Err(ReindexError::StoredRootMismatch {
            batch_index,
            stored: batch.merkle_root,
            anchored,
        });
    }

    let blob = store.fetch(&batch.content_id).await?;
    let content = BatchContent::from_bytes(&blob).map_err(CommitError::from)?;
    let tree = content.rebuild_tree().map_err(CommitError::from)?;
    if tree.root() != anchored {
        return Err(ReindexError::RootMismatch {
            batch_index,
            expected: anchored,
            rebuilt: tree.root(),
        });
    }

    let proofs = build_proof_records(&content, &tree, batch_index, &batch.content_id)?;
    db.replace_batch_proofs(batch_index, &proofs).await?;

    info!("Reindexed batch {} ({} proofs)", batch_index, proofs.len());
    Ok(proofs.len())
}
