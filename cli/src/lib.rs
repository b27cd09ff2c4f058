pub mod client;
pub mod consts;
pub mod content;
pub mod merkle;
pub mod utils;

pub use content::*;
pub use merkle::*;

use alloy_primitives::B256;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use vote_ledger::VoteSubmission;

use crate::utils::{parse_address, parse_signature};

/// A vote as written by hand in a JSON input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInput {
    pub voter: String,
    pub choice_id: u64,
    #[serde(default)]
    pub signature: Option<String>,
}

impl VoteInput {
    pub fn to_submission(&self) -> Result<VoteSubmission> {
        let voter = parse_address(&self.voter).map_err(|e| anyhow!(e))?;
        let signature = match &self.signature {
            Some(sig) => parse_signature(sig).map_err(|e| anyhow!(e))?,
            None => Default::default(),
        };
        Ok(VoteSubmission {
            voter,
            choice_id: self.choice_id,
            signature,
        })
    }
}

/// One leaf of a locally built tree, with its proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafProof {
    pub voter: String,
    pub choice_id: u64,
    pub leaf: B256,
    pub proof: Vec<ProofNode>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeReport {
    pub merkle_root: B256,
    pub leaves: Vec<LeafProof>,
}

/// Builds the batch tree over `inputs` in the given order.
pub fn build_tree_report(inputs: &[VoteInput]) -> Result<TreeReport> {
    let votes = inputs
        .iter()
        .map(VoteInput::to_submission)
        .collect::<Result<Vec<_>>>()?;
    let (content, tree) = BatchContent::build(&votes)?;

    let leaves = content
        .valid_votes
        .iter()
        .enumerate()
        .map(|(i, vote)| {
            let proof = tree
                .get_proof(i)
                .ok_or_else(|| anyhow!("no proof for leaf {i}"))?;
            Ok(LeafProof {
                voter: vote.voter.clone(),
                choice_id: vote.choice_id,
                leaf: tree.leaves()[i],
                proof,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TreeReport {
        merkle_root: tree.root(),
        leaves,
    })
}
