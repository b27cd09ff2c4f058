use std::collections::HashSet;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::BatchReceipt;

/// Full state of the voting contract.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingContract {
    /// Voters with an accepted vote.
    pub has_voted: HashSet<Address>,
    /// Batch roots, indexed by batch index.
    pub merkle_roots: Vec<B256>,
    /// Receipts of every processed batch, in submission order.
    pub receipts: Vec<BatchReceipt>,
    /// Number of state-changing transactions so far.
    pub tx_count: u64,
}

impl VotingContract {
    pub fn receipt(&self, batch_key: &B256) -> Option<&BatchReceipt> {
        self.receipts.iter().find(|r| r.batch_key == *batch_key)
    }

    pub fn batch_count(&self) -> u64 {
        self.merkle_roots.len() as u64
    }
}
