use alloy_primitives::{keccak256, Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Width of the voter address in the packed leaf encoding.
pub const ADDRESS_BYTES: usize = 20;
/// Width of the choice id in the packed leaf encoding (uint256).
pub const CHOICE_BYTES: usize = 32;
/// Total width of a packed leaf preimage.
pub const PACKED_LEAF_BYTES: usize = ADDRESS_BYTES + CHOICE_BYTES;

/// The committed part of a vote: who voted and for what.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteLeaf {
    /// Voter address.
    pub voter: Address,
    /// Choice the voter selected.
    pub choice_id: u64,
}

impl VoteLeaf {
    pub fn new(voter: Address, choice_id: u64) -> Self {
        Self { voter, choice_id }
    }

    /// Tightly packed `address ‖ uint256` encoding, choice id big-endian.
    pub fn packed(&self) -> [u8; PACKED_LEAF_BYTES] {
        let mut buf = [0u8; PACKED_LEAF_BYTES];
        buf[..ADDRESS_BYTES].copy_from_slice(self.voter.as_slice());
        buf[PACKED_LEAF_BYTES - 8..].copy_from_slice(&self.choice_id.to_be_bytes());
        buf
    }

    pub fn hash(&self) -> B256 {
        keccak256(self.packed())
    }
}

/// A vote as handed to the ledger's batch entry point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubmission {
    /// Voter address, already normalized.
    pub voter: Address,
    /// Choice the voter selected.
    pub choice_id: u64,
    /// Voter's signature over the vote.
    pub signature: Bytes,
}

impl VoteSubmission {
    pub fn leaf(&self) -> VoteLeaf {
        VoteLeaf::new(self.voter, self.choice_id)
    }
}
