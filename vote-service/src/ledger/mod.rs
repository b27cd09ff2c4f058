//! Ledger adapters

pub mod http;
pub mod local;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, B256};
use async_trait::async_trait;
use vote_ledger::{BatchReceipt, VoteSubmission};

use crate::config::LedgerConfig;
use crate::error::LedgerError;

pub use http::HttpLedger;
pub use local::LocalLedger;

/// Per-vote outcome of a batch submission, as reported by the ledger.
pub type SubmitReceipt = BatchReceipt;

/// Call contract of the ledger service of record.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submits a batch as one atomic call. Submitting a key the ledger has
    /// already processed returns the original receipt.
    async fn submit_batch(
        &self,
        batch_key: B256,
        votes: &[VoteSubmission],
    ) -> Result<SubmitReceipt, LedgerError>;

    /// Receipt of a previously submitted batch, if it landed.
    async fn receipt(&self, batch_key: B256) -> Result<Option<SubmitReceipt>, LedgerError>;

    /// Stores a batch root and returns its ledger-assigned index.
    async fn store_root(&self, merkle_root: B256) -> Result<u64, LedgerError>;

    async fn get_root(&self, batch_index: u64) -> Result<Option<B256>, LedgerError>;

    async fn batch_count(&self) -> Result<u64, LedgerError>;
}

/// Idempotency key of the submission made for `claim_id`.
pub fn batch_key(claim_id: &str) -> B256 {
    keccak256(claim_id.as_bytes())
}

/// Bounds a ledger call so a hung request surfaces as `Timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| LedgerError::Timeout(timeout.as_secs()))?
}

pub async fn build_ledger(config: &LedgerConfig, timeout: Duration) -> anyhow::Result<Arc<dyn Ledger>> {
    Ok(match config {
        LedgerConfig::Local { state_path } => match state_path {
            Some(path) => Arc::new(LocalLedger::open(path).await?),
            None => Arc::new(LocalLedger::new()),
        },
        LedgerConfig::Http { url } => Arc::new(HttpLedger::new(url, timeout)?),
    })
}
