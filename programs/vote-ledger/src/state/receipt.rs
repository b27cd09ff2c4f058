use std::fmt;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Emitted for every vote the ledger accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccepted {
    pub voter: Address,
    pub choice_id: u64,
}

/// Emitted for every vote the ledger refused, with a human readable reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSkipped {
    pub voter: Address,
    pub reason: String,
}

/// Reasons the reference contract skips a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyVoted,
    DuplicateInBatch,
    InvalidSignature,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::AlreadyVoted => "already voted",
            SkipReason::DuplicateInBatch => "duplicate in batch",
            SkipReason::InvalidSignature => "invalid signature",
        };
        f.write_str(reason)
    }
}

/// Outcome of one `submit_votes` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    /// Idempotency key the batch was submitted under.
    pub batch_key: B256,
    /// Transaction the batch landed in.
    pub tx_hash: B256,
    pub accepted: Vec<VoteAccepted>,
    pub skipped: Vec<VoteSkipped>,
    /// Whether the transaction is final.
    pub confirmed: bool,
}
