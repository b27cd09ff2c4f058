//! Vote ingestion into the pending pool

use alloy_primitives::hex;
use cli::utils::{normalize_address, parse_signature};
use tracing::debug;

use crate::database::{Database, InsertOutcome, PendingVote};
use crate::error::IngestError;
use crate::metrics::{self, IngestOutcome};
use crate::trigger::TriggerHandle;

/// Validates and normalizes a submitted vote without touching storage.
pub fn normalize_vote(
    voter: &str,
    choice_id: u64,
    signature: &str,
) -> Result<PendingVote, IngestError> {
    let voter = normalize_address(voter).map_err(IngestError::Malformed)?;
    let signature = parse_signature(signature).map_err(IngestError::Malformed)?;
    // Choice ids are stored in a signed INTEGER column.
    if i64::try_from(choice_id).is_err() {
        return Err(IngestError::Malformed(format!(
            "choice id {choice_id} is out of range"
        )));
    }

    Ok(PendingVote {
        voter,
        choice_id,
        signature: hex::encode_prefixed(&signature),
    })
}

/// Adds a vote to the pending pool and nudges the batch trigger. Returns as
/// soon as the vote is stored; the commitment runs separately.
pub async fn ingest_vote(
    db: &Database,
    trigger: &TriggerHandle,
    voter: &str,
    choice_id: u64,
    signature: &str,
) -> Result<PendingVote, IngestError> {
    let vote = match normalize_vote(voter, choice_id, signature) {
        Ok(vote) => vote,
        Err(e) => {
            metrics::record_ingest(IngestOutcome::Malformed);
            return Err(e);
        }
    };

    let outcome = db.insert_pending_vote(&vote).await.inspect_err(|_| {
        metrics::record_ingest(IngestOutcome::Internal);
    })?;

    match outcome {
        InsertOutcome::Inserted => {
            metrics::record_ingest(IngestOutcome::Accepted);
            debug!("Queued vote from {}", vote.voter);
            trigger.notify_vote();
            Ok(vote)
        }
        InsertOutcome::AlreadyPending => {
            metrics::record_ingest(IngestOutcome::Duplicate);
            Err(IngestError::AlreadyPending)
        }
        InsertOutcome::AlreadyVoted => {
            metrics::record_ingest(IngestOutcome::Duplicate);
            Err(IngestError::AlreadyVoted)
        }
    }
}
