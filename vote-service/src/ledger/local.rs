//! In-process reference ledger

use std::path::{Path, PathBuf};

use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use vote_ledger::{VoteSubmission, VotingContract};

use super::{Ledger, SubmitReceipt};
use crate::error::LedgerError;

/// Runs the reference voting contract in memory, optionally mirroring its
/// state to a JSON file after every state change.
#[derive(Debug, Default)]
pub struct LocalLedger {
    contract: Mutex<VotingContract>,
    state_path: Option<PathBuf>,
}

impl LocalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing contract state.
    pub fn with_contract(contract: VotingContract) -> Self {
        Self {
            contract: Mutex::new(contract),
            state_path: None,
        }
    }

    /// Loads state from `path` if it exists and persists to it from then on.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let contract = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let contract: VotingContract = serde_json::from_slice(&bytes)?;
                info!(
                    "Loaded local ledger state from {:?} ({} batches)",
                    path,
                    contract.batch_count()
                );
                contract
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VotingContract::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            contract: Mutex::new(contract),
            state_path: Some(path.to_path_buf()),
        })
    }

    pub async fn snapshot(&self) -> VotingContract {
        self.contract.lock().await.clone()
    }

    async fn persist(&self, contract: &VotingContract) -> Result<(), LedgerError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(contract)
            .map_err(|e| LedgerError::Unavailable(format!("encode ledger state: {e}")))?;
        let tmp = path.with_extension("tmp");
        let write = async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, path).await
        };
        write
            .await
            .map_err(|e| LedgerError::Unavailable(format!("persist ledger state: {e}")))?;
        debug!("Persisted local ledger state to {:?}", path);
        Ok(())
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn submit_batch(
        &self,
        batch_key: B256,
        votes: &[VoteSubmission],
    ) -> Result<SubmitReceipt, LedgerError> {
        let mut contract = self.contract.lock().await;
        let receipt = contract
            .submit_votes(batch_key, votes)
            .map_err(|e| LedgerError::Reverted(e.to_string()))?;
        self.persist(&contract).await?;
        Ok(receipt)
    }

    async fn receipt(&self, batch_key: B256) -> Result<Option<SubmitReceipt>, LedgerError> {
        Ok(self.contract.lock().await.receipt(&batch_key).cloned())
    }

    async fn store_root(&self, merkle_root: B256) -> Result<u64, LedgerError> {
        let mut contract = self.contract.lock().await;
        let index = contract
            .store_merkle_root(merkle_root)
            .map_err(|e| LedgerError::Reverted(e.to_string()))?;
        self.persist(&contract).await?;
        Ok(index)
    }

    async fn get_root(&self, batch_index: u64) -> Result<Option<B256>, LedgerError> {
        Ok(self.contract.lock().await.get_merkle_root(batch_index))
    }

    async fn batch_count(&self) -> Result<u64, LedgerError> {
        Ok(self.contract.lock().await.batch_count())
    }
}
