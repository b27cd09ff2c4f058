use alloy_primitives::{hex, Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vote_ledger::{VoteLeaf, VoteSubmission};

use crate::{
    merkle::{MerkleError, ProofNode},
    utils::parse_address,
    MerkleTree,
};

#[derive(Debug, Error)]
pub enum BatchContentError {
    #[error("batch content is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("batch content holds an invalid voter: {0}")]
    InvalidVoter(String),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// One accepted vote as published in an anchored batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidVote {
    /// EIP-55 checksummed voter address.
    pub voter: String,
    pub choice_id: u64,
    /// `0x`-prefixed signature hex.
    pub signature: String,
}

impl ValidVote {
    pub fn from_submission(vote: &VoteSubmission) -> Self {
        Self {
            voter: vote.voter.to_checksum(None),
            choice_id: vote.choice_id,
            signature: hex::encode_prefixed(&vote.signature),
        }
    }

    pub fn voter_address(&self) -> Result<Address, BatchContentError> {
        parse_address(&self.voter).map_err(BatchContentError::InvalidVoter)
    }

    pub fn leaf(&self) -> Result<B256, BatchContentError> {
        Ok(VoteLeaf::new(self.voter_address()?, self.choice_id).hash())
    }
}

/// The blob published to content-addressed storage for one batch.
///
/// Leaf order is the order of `valid_votes`; anyone holding the blob can
/// rebuild the tree without further input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchContent {
    pub merkle_root: B256,
    pub valid_votes: Vec<ValidVote>,
}

impl BatchContent {
    pub fn build(votes: &[VoteSubmission]) -> Result<(Self, MerkleTree), MerkleError> {
        let leaves: Vec<B256> = votes.iter().map(|vote| vote.leaf().hash()).collect();
        let tree = MerkleTree::new(&leaves)?;
        let content = Self {
            merkle_root: tree.root(),
            valid_votes: votes.iter().map(ValidVote::from_submission).collect(),
        };
        Ok((content, tree))
    }

    pub fn leaves(&self) -> Result<Vec<B256>, BatchContentError> {
        self.valid_votes.iter().map(ValidVote::leaf).collect()
    }

    /// Rebuilds the tree from the votes alone, ignoring `merkle_root`.
    pub fn rebuild_tree(&self) -> Result<MerkleTree, BatchContentError> {
        Ok(MerkleTree::new(&self.leaves()?)?)
    }

    pub fn contains(&self, voter: &Address, choice_id: u64) -> bool {
        self.valid_votes.iter().any(|vote| {
            vote.choice_id == choice_id
                && vote
                    .voter_address()
                    .map(|address| address == *voter)
                    .unwrap_or(false)
        })
    }

    /// Leaf index and sibling path of `voter`'s vote, located by its leaf
    /// hash in `tree`.
    pub fn proof_for(
        &self,
        tree: &MerkleTree,
        voter: &Address,
    ) -> Result<Option<(usize, Vec<ProofNode>)>, BatchContentError> {
        let Some(vote) = self.valid_votes.iter().find(|vote| {
            vote.voter_address()
                .map(|address| address == *voter)
                .unwrap_or(false)
        }) else {
            return Ok(None);
        };

        let leaf = vote.leaf()?;
        Ok(tree
            .position(&leaf)
            .and_then(|index| tree.get_proof(index).map(|proof| (index, proof))))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BatchContentError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
