use alloy_primitives::{keccak256, B256};

use crate::error::{ErrorCode, Result};

/// Hashes two sibling nodes, smaller hash first.
///
/// Sorting makes the pairing independent of left/right order, so a verifier
/// only needs the sibling values along the path. Nodes carry no leaf or
/// intermediate prefix: the root of a one-leaf tree is the leaf itself.
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(low.as_slice());
    buf[32..].copy_from_slice(high.as_slice());
    keccak256(buf)
}

/// Folds a leaf with its sibling hashes up to the root they imply.
pub fn compute_root(leaf: B256, proof: &[B256]) -> B256 {
    proof
        .iter()
        .fold(leaf, |node, sibling| hash_pair(&node, sibling))
}

/// Verifies a Merkle proof from a leaf hash and its sibling hashes.
///
/// Compares the reconstructed root with the expected `root` and returns an
/// error if it doesn't match.
pub fn verify_helper(leaf: B256, proof: &[B256], root: B256) -> Result<()> {
    let node = compute_root(leaf, proof);
    if node != root {
        return Err(ErrorCode::InvalidMerkleProof);
    }

    Ok(())
}
