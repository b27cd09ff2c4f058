//! Proof verifier
//!
//! Answers "was this vote committed?" from the anchored content and the
//! ledger's stored root alone. The root inside the anchored blob is never
//! trusted.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use cli::{BatchContent, ProofNode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vote_ledger::VoteLeaf;

use crate::content::ContentStore;
use crate::database::Database;
use crate::error::{ContentError, VerifyError};
use crate::ledger::{with_timeout, Ledger};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    NoProof,
    NotInBatch,
    RootMismatch,
    ContentCorrupt,
    UnknownBatch,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Valid => "valid",
            Verdict::NoProof => "no_proof",
            Verdict::NotInBatch => "not_in_batch",
            Verdict::RootMismatch => "root_mismatch",
            Verdict::ContentCorrupt => "content_corrupt",
            Verdict::UnknownBatch => "unknown_batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub voter: String,
    pub choice_id: u64,
    pub verdict: Verdict,
    pub is_valid: bool,
    pub batch_index: Option<u64>,
    pub content_id: Option<String>,
    pub proof_path: Vec<ProofNode>,
    pub expected_leaf: B256,
    pub ledger_root: Option<B256>,
    pub rebuilt_root: Option<B256>,
}

impl VerificationReport {
    fn new(voter: Address, choice_id: u64) -> Self {
        Self {
            voter: voter.to_checksum(None),
            choice_id,
            verdict: Verdict::NoProof,
            is_valid: false,
            batch_index: None,
            content_id: None,
            proof_path: Vec::new(),
            expected_leaf: VoteLeaf::new(voter, choice_id).hash(),
            ledger_root: None,
            rebuilt_root: None,
        }
    }

    fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self.is_valid = verdict == Verdict::Valid;
        self
    }
}

#[derive(Clone)]
pub struct ProofVerifier {
    db: Database,
    ledger: Arc<dyn Ledger>,
    content: Arc<dyn ContentStore>,
    ledger_timeout: Duration,
}

impl ProofVerifier {
    pub fn new(
        db: Database,
        ledger: Arc<dyn Ledger>,
        content: Arc<dyn ContentStore>,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            db,
            ledger,
            content,
            ledger_timeout,
        }
    }

    pub async fn verify(
        &self,
        voter: Address,
        choice_id: u64,
    ) -> Result<VerificationReport, VerifyError> {
        let result = self.check(voter, choice_id).await;
        match &result {
            Ok(report) => {
                metrics::record_verdict(report.verdict);
                info!(
                    "Verified {} choice {}: {}",
                    report.voter,
                    choice_id,
                    report.verdict.as_str()
                );
            }
            Err(VerifyError::Unavailable(reason)) => {
                metrics::record_verify_unavailable();
                warn!("Cannot verify {} now: {}", voter, reason);
            }
            Err(_) => {}
        }
        result
    }

    async fn check(
        &self,
        voter: Address,
        choice_id: u64,
    ) -> Result<VerificationReport, VerifyError> {
        let mut report = VerificationReport::new(voter, choice_id);

        let Some(record) = self.db.get_proof_record(&report.voter).await? else {
            return Ok(report.with_verdict(Verdict::NoProof));
        };
        report.batch_index = Some(record.batch_index);
        report.content_id = Some(record.content_id.clone());
        report.proof_path = record.proof_path;

        let blob = match self.content.fetch(&record.content_id).await {
            Ok(blob) => blob,
            Err(ContentError::Corrupt(id)) => {
                debug!("Content {} failed its integrity check", id);
                return Ok(report.with_verdict(Verdict::ContentCorrupt));
            }
            Err(e) => return Err(VerifyError::Unavailable(e.to_string())),
        };

        let content = match BatchContent::from_bytes(&blob) {
            Ok(content) => content,
            Err(e) => {
                debug!("Content {} does not decode: {}", record.content_id, e);
                return Ok(report.with_verdict(Verdict::ContentCorrupt));
            }
        };
        if !content.contains(&voter, choice_id) {
            return Ok(report.with_verdict(Verdict::NotInBatch));
        }
        let rebuilt_root = match content.rebuild_tree() {
            Ok(tree) => tree.root(),
            Err(e) => {
                debug!("Content {} does not rebuild: {}", record.content_id, e);
                return Ok(report.with_verdict(Verdict::ContentCorrupt));
            }
        };
        report.rebuilt_root = Some(rebuilt_root);

        let ledger_root = with_timeout(
            self.ledger_timeout,
            self.ledger.get_root(record.batch_index),
        )
        .await?;
        let Some(ledger_root) = ledger_root else {
            return Ok(report.with_verdict(Verdict::UnknownBatch));
        };
        report.ledger_root = Some(ledger_root);

        let verdict = if ledger_root == rebuilt_root {
            Verdict::Valid
        } else {
            Verdict::RootMismatch
        };
        Ok(report.with_verdict(verdict))
    }
}
