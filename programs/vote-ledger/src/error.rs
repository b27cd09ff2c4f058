use thiserror::Error;

use crate::instructions::submit_votes::MAX_BATCH_VOTES;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("Empty vote batch")]
    EmptyBatch,
    #[error("Vote batch exceeds {} votes", MAX_BATCH_VOTES)]
    BatchTooLarge,
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
    #[error("Invalid merkle proof")]
    InvalidMerkleProof,
    #[error("Batch index overflow")]
    BatchIndexOverflow,
}

pub type Result<T> = std::result::Result<T, ErrorCode>;
