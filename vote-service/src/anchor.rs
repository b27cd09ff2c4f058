//! Commitment anchor: root on the ledger, contents in the content store

use std::time::Duration;

use alloy_primitives::B256;
use cli::{BatchContent, MerkleTree};
use tracing::{info, warn};
use vote_ledger::VoteSubmission;

use crate::content::ContentStore;
use crate::error::CommitError;
use crate::ledger::{with_timeout, Ledger};

/// Accumulates the valid set in ledger order.
pub fn build_content(valid: &[VoteSubmission]) -> Result<(BatchContent, MerkleTree), CommitError> {
    Ok(BatchContent::build(valid)?)
}

pub async fn store_root(
    ledger: &dyn Ledger,
    timeout: Duration,
    merkle_root: B256,
) -> Result<u64, CommitError> {
    let batch_index = with_timeout(timeout, ledger.store_root(merkle_root)).await?;
    info!("Stored root {} at batch index {}", merkle_root, batch_index);
    Ok(batch_index)
}

/// Stores `merkle_root` unless the ledger's latest root already is this one,
/// in which case the earlier call landed and its index is reused.
pub async fn reconcile_root(
    ledger: &dyn Ledger,
    timeout: Duration,
    merkle_root: B256,
) -> Result<u64, CommitError> {
    let count = with_timeout(timeout, ledger.batch_count()).await?;
    if let Some(last) = count.checked_sub(1) {
        let latest = with_timeout(timeout, ledger.get_root(last)).await?;
        if latest == Some(merkle_root) {
            info!("Root {} already stored at batch index {}", merkle_root, last);
            return Ok(last);
        }
    }

    warn!("Root {} not found on the ledger, storing it", merkle_root);
    store_root(ledger, timeout, merkle_root).await
}

/// Publishes the canonical batch blob and returns its content id.
pub async fn publish(store: &dyn ContentStore, content: &BatchContent) -> Result<String, CommitError> {
    let blob = content.to_bytes()?;
    let content_id = store.publish(&blob).await?;
    info!(
        "Anchored {} votes under root {} as {}",
        content.valid_votes.len(),
        content.merkle_root,
        content_id
    );
    Ok(content_id)
}
