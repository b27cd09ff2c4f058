use std::fmt;
use std::str::FromStr;

use alloy_primitives::B256;
use anyhow::anyhow;
use cli::ProofNode;
use serde::{Deserialize, Serialize};
use vote_ledger::BatchReceipt;

/// A vote waiting in the pool, as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVote {
    /// Checksummed voter address
    pub voter: String,
    pub choice_id: u64,
    /// 0x-prefixed signature hex
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPending,
    AlreadyVoted,
}

/// Votes taken out of the open pool under one claim id.
#[derive(Debug, Clone)]
pub struct Claim {
    pub claim_id: String,
    pub votes: Vec<PendingVote>,
}

/// Journal stages of a commitment, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    Claimed,
    Submitting,
    Submitted,
    Rooting,
    Rooted,
    Published,
    Complete,
    Released,
}

impl CommitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStage::Claimed => "claimed",
            CommitStage::Submitting => "submitting",
            CommitStage::Submitted => "submitted",
            CommitStage::Rooting => "rooting",
            CommitStage::Rooted => "rooted",
            CommitStage::Published => "published",
            CommitStage::Complete => "complete",
            CommitStage::Released => "released",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, CommitStage::Complete | CommitStage::Released)
    }

    /// Stages at which the ledger has not yet confirmed the submission.
    pub fn before_confirmation(&self) -> bool {
        matches!(self, CommitStage::Claimed | CommitStage::Submitting)
    }
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "claimed" => CommitStage::Claimed,
            "submitting" => CommitStage::Submitting,
            "submitted" => CommitStage::Submitted,
            "rooting" => CommitStage::Rooting,
            "rooted" => CommitStage::Rooted,
            "published" => CommitStage::Published,
            "complete" => CommitStage::Complete,
            "released" => CommitStage::Released,
            other => return Err(anyhow!("unknown commitment stage '{}'", other)),
        })
    }
}

/// One row of the commitment journal
#[derive(Debug, Clone)]
pub struct CommitmentRecord {
    pub claim_id: String,
    pub stage: CommitStage,
    pub votes: Vec<PendingVote>,
    pub receipt: Option<BatchReceipt>,
    pub batch_index: Option<u64>,
    pub merkle_root: Option<B256>,
    pub content_id: Option<String>,
    pub error: Option<String>,
    pub updated_at: String,
}

/// Fields written alongside a stage change; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct CommitmentUpdate {
    pub receipt: Option<BatchReceipt>,
    pub batch_index: Option<u64>,
    pub merkle_root: Option<B256>,
    pub content_id: Option<String>,
}

/// Committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_index: u64,
    pub merkle_root: B256,
    pub content_id: String,
    pub vote_count: u64,
    pub claim_id: String,
    pub created_at: String, // ISO8601 UTC timestamp
}

/// Where a voter's vote was committed, and the path proving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub voter: String,
    pub choice_id: u64,
    pub batch_index: u64,
    pub content_id: String,
    pub leaf: B256,
    pub proof_path: Vec<ProofNode>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedVoteRecord {
    pub claim_id: String,
    pub voter: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub in_flight: bool,
    pub claim_id: Option<String>,
    pub claimed_at: Option<String>,
}

/// Everything written when a commitment completes.
#[derive(Debug, Clone)]
pub struct FinalizeBatch {
    pub claim_id: String,
    /// `None` when no vote was accepted.
    pub batch: Option<BatchRecord>,
    pub proofs: Vec<ProofRecord>,
    pub rejected: Vec<RejectedVoteRecord>,
}
