use std::collections::HashSet;

use alloy_primitives::{keccak256, B256};

use crate::{
    error::{ErrorCode, Result},
    BatchReceipt, SkipReason, VoteAccepted, VoteSkipped, VoteSubmission, VotingContract,
};

pub const MAX_BATCH_VOTES: usize = 1024;
/// r ‖ s ‖ v
pub const SIGNATURE_LEN: usize = 65;

pub fn handler(
    contract: &mut VotingContract,
    batch_key: B256,
    votes: &[VoteSubmission],
) -> Result<BatchReceipt> {
    // A batch key that was already processed returns its original receipt.
    if let Some(receipt) = contract.receipt(&batch_key) {
        return Ok(receipt.clone());
    }

    if votes.is_empty() {
        return Err(ErrorCode::EmptyBatch);
    }
    if votes.len() > MAX_BATCH_VOTES {
        return Err(ErrorCode::BatchTooLarge);
    }

    let mut seen = HashSet::with_capacity(votes.len());
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();

    for vote in votes {
        let reason = if vote.signature.len() != SIGNATURE_LEN {
            Some(SkipReason::InvalidSignature)
        } else if contract.has_voted.contains(&vote.voter) {
            Some(SkipReason::AlreadyVoted)
        } else if !seen.insert(vote.voter) {
            Some(SkipReason::DuplicateInBatch)
        } else {
            None
        };

        match reason {
            Some(reason) => skipped.push(VoteSkipped {
                voter: vote.voter,
                reason: reason.to_string(),
            }),
            None => accepted.push(VoteAccepted {
                voter: vote.voter,
                choice_id: vote.choice_id,
            }),
        }
    }

    // State only changes once the whole batch has been evaluated.
    contract
        .has_voted
        .extend(accepted.iter().map(|event| event.voter));
    contract.tx_count += 1;

    let mut preimage = [0u8; 40];
    preimage[..32].copy_from_slice(batch_key.as_slice());
    preimage[32..].copy_from_slice(&contract.tx_count.to_be_bytes());

    let receipt = BatchReceipt {
        batch_key,
        tx_hash: keccak256(preimage),
        accepted,
        skipped,
        confirmed: true,
    };
    contract.receipts.push(receipt.clone());

    Ok(receipt)
}
