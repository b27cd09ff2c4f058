
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use vote_ledger::MAX_BATCH_VOTES;
use vote_service::config::PipelineSettings;
use vote_service::database::{Claim, Database, PendingVote};
use vote_service::error::ReindexError;
use vote_service::indexer::reindex_batch;
use vote_service::ingest::normalize_vote;
use vote_service::{CommitOutcome, Committer, ProofVerifier};

pub use fakes::{ScriptedLedger, TamperableStore};

pub fn voter(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn voter_str(byte: u8) -> String {
    voter(byte).to_checksum(None)
}

pub fn pending(byte: u8, choice_id: u64) -> PendingVote {
    normalize_vote(&voter_str(byte), choice_id, &format!("0x{}", "1b".repeat(65))).unwrap()
}

/// Distinct voter for bulk pools, beyond the 255 of `voter`.
pub fn numbered_voter(n: u32) -> Address {
    let mut bytes = [0x11u8; 20];
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    Address::from(bytes)
}

pub fn numbered_pending(n: u32, choice_id: u64) -> PendingVote {
    normalize_vote(
        &numbered_voter(n).to_checksum(None),
        choice_id,
        &format!("0x{}", "1b".repeat(65)),
    )
    .unwrap()
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        batch_threshold: 1,
        ledger_timeout: Duration::from_secs(2),
        confirmation_polls: 2,
        confirmation_poll_interval: Duration::from_millis(10),
        proof_store_retries: 2,
        retry_backoff: Duration::from_millis(10),
        max_batch_votes: MAX_BATCH_VOTES,
    }
}

/// One in-memory pipeline: database, scripted ledger and content store.
pub struct TestContext {
    pub db: Database,
    pub ledger: Arc<ScriptedLedger>,
    pub store: Arc<TamperableStore>,
    pub committer: Arc<Committer>,
    pub verifier: ProofVerifier,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_ledger(ScriptedLedger::new()).await
    }

    pub async fn with_ledger(ledger: ScriptedLedger) -> Self {
        let db = Database::connect(":memory:").await.unwrap();
        let ledger = Arc::new(ledger);
        let store = Arc::new(TamperableStore::new());
        let settings = fast_settings();
        let committer = Arc::new(Committer::new(
            db.clone(),
            ledger.clone(),
            store.clone(),
            settings.clone(),
        ));
        let verifier =
            ProofVerifier::new(db.clone(), ledger.clone(), store.clone(), settings.ledger_timeout);

        Self {
            db,
            ledger,
            store,
            committer,
            verifier,
        }
    }

    pub async fn add_vote(&self, byte: u8, choice_id: u64) {
        self.db.insert_pending_vote(&pending(byte, choice_id)).await.unwrap();
    }

    pub async fn claim(&self, claim_id: &str) -> Option<Claim> {
        self.db
            .claim_pool(claim_id, 1, MAX_BATCH_VOTES)
            .await
            .unwrap()
    }

    pub async fn reindex(&self, batch_index: u64) -> Result<usize, ReindexError> {
        reindex_batch(
            &self.db,
            self.ledger.as_ref(),
            fast_settings().ledger_timeout,
            self.store.as_ref(),
            batch_index,
        )
        .await
    }

    /// Claims the whole pool under `claim_id` and commits it.
    pub async fn commit(&self, claim_id: &str) -> CommitOutcome {
        let claim = self.claim(claim_id).await.expect("pool should be claimable");
        self.committer.commit_claim(claim).await
    }
}
