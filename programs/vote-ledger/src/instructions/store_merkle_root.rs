use alloy_primitives::B256;

use crate::{
    error::{ErrorCode, Result},
    VotingContract,
};

/// Appends a batch root and returns the index it was stored under.
pub fn handler(contract: &mut VotingContract, merkle_root: B256) -> Result<u64> {
    if merkle_root == B256::ZERO {
        return Err(ErrorCode::InvalidMerkleRoot);
    }

    let batch_index = contract.batch_count();
    batch_index
        .checked_add(1)
        .ok_or(ErrorCode::BatchIndexOverflow)?;

    contract.merkle_roots.push(merkle_root);
    contract.tx_count += 1;

    Ok(batch_index)
}
