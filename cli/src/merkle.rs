use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vote_ledger::merkle_helper::hash_pair;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a merkle tree without leaves")]
    EmptyLeaves,
}

/// Which side of the path node a proof sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub position: Position,
    pub data: B256,
}

/// Sibling hashes of a proof, in path order, orientation dropped.
pub fn proof_hashes(proof: &[ProofNode]) -> Vec<B256> {
    proof.iter().map(|node| node.data).collect()
}

/// Binary merkle tree with sorted-pair hashing.
///
/// An odd node at the end of a layer is carried up unchanged, so every layer
/// is `ceil(len / 2)` of the one below it.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    layers: Vec<Vec<B256>>,
}

impl MerkleTree {
    pub fn new(leaves: &[B256]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyLeaves);
        }

        let mut layers = vec![leaves.to_vec()];
        while let Some(layer) = layers.last().filter(|layer| layer.len() > 1) {
            let next = layer
                .chunks(2)
                .map(|pair| {
                    pair.get(1)
                        .map_or(pair[0], |right| hash_pair(&pair[0], right))
                })
                .collect();
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> B256 {
        // Construction guarantees a non-empty top layer.
        self.layers[self.layers.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    pub fn position(&self, leaf: &B256) -> Option<usize> {
        self.layers[0].iter().position(|candidate| candidate == leaf)
    }

    /// Sibling path for the leaf at `index`, bottom to top.
    pub fn get_proof(&self, index: usize) -> Option<Vec<ProofNode>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut proof = Vec::new();
        let mut idx = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = idx ^ 1;
            if let Some(data) = layer.get(sibling) {
                let position = if sibling < idx {
                    Position::Left
                } else {
                    Position::Right
                };
                proof.push(ProofNode {
                    position,
                    data: *data,
                });
            }
            idx /= 2;
        }

        Some(proof)
    }
}
