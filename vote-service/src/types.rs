//! Types for HTTP requests and responses

use serde::{Deserialize, Serialize};

use crate::database::BatchRecord;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub voter: String,
    #[serde(alias = "partyId")]
    pub choice_id: u64,
    pub signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub status: &'static str,
    pub voter: String,
    pub choice_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub voter: String,
    #[serde(alias = "partyId")]
    pub choice_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchesResponse {
    pub batches: Vec<BatchRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexResponse {
    pub batch_index: u64,
    pub proofs: usize,
}
