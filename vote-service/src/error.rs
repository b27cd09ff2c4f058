//! Error types of the commitment engine

use cli::{BatchContentError, MerkleError};
use thiserror::Error;

/// Failures talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger call reverted: {0}")]
    Reverted(String),
    #[error("ledger call timed out after {0}s")]
    Timeout(u64),
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content {0} not found")]
    NotFound(String),
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    #[error("content exceeds {0} bytes")]
    TooLarge(usize),
    #[error("content {0} does not match its identifier")]
    Corrupt(String),
    #[error("content store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that stops a commitment from advancing.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
    #[error("integrity failure: {0}")]
    Integrity(String),
    #[error("submission was not confirmed by the ledger")]
    NotConfirmed,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Batch(#[from] BatchContentError),
}

impl CommitError {
    /// Whether the submission is known not to have taken effect, so the
    /// claimed votes can safely go back to the pool.
    pub fn is_definitive_rejection(&self) -> bool {
        matches!(
            self,
            CommitError::NotConfirmed
                | CommitError::Integrity(_)
                | CommitError::Ledger(LedgerError::Reverted(_))
        )
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot verify now: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<LedgerError> for VerifyError {
    fn from(err: LedgerError) -> Self {
        VerifyError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed vote: {0}")]
    Malformed(String),
    #[error("voter already has a pending vote")]
    AlreadyPending,
    #[error("voter already has a committed vote")]
    AlreadyVoted,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Failures regenerating the proofs of a committed batch.
#[derive(Debug, Error)]
pub enum ReindexError {
    #[error("batch {0} is not committed")]
    UnknownBatch(u64),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("batch {0} has no root on the ledger")]
    Unanchored(u64),
    #[error("batch {batch_index} records root {stored} but the ledger holds {anchored}")]
    StoredRootMismatch {
        batch_index: u64,
        stored: alloy_primitives::B256,
        anchored: alloy_primitives::B256,
    },
    #[error("anchored content of batch {batch_index} rebuilds to {rebuilt}, expected {expected}")]
    RootMismatch {
        batch_index: u64,
        expected: alloy_primitives::B256,
        rebuilt: alloy_primitives::B256,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}
