#![allow(ambiguous_glob_reexports)]

pub mod error;
pub mod instructions;
pub mod merkle_helper;
pub mod state;

use alloy_primitives::{Address, B256};

pub use error::{ErrorCode, Result};
pub use instructions::*;
pub use state::*;

impl VotingContract {
    /// Processes a batch of votes under an idempotency key.
    ///
    /// Each vote is either accepted or skipped; the batch as a whole only
    /// fails when it is empty or oversized. Replaying a key returns the
    /// receipt of the first call without touching state.
    pub fn submit_votes(
        &mut self,
        batch_key: B256,
        votes: &[VoteSubmission],
    ) -> Result<BatchReceipt> {
        submit_votes::handler(self, batch_key, votes)
    }

    pub fn store_merkle_root(&mut self, merkle_root: B256) -> Result<u64> {
        store_merkle_root::handler(self, merkle_root)
    }

    pub fn get_merkle_root(&self, batch_index: u64) -> Option<B256> {
        usize::try_from(batch_index)
            .ok()
            .and_then(|index| self.merkle_roots.get(index))
            .copied()
    }

    pub fn has_voted(&self, voter: &Address) -> bool {
        self.has_voted.contains(voter)
    }
}
