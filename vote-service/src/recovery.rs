//! Startup recovery of interrupted commitments

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::database::CommitStage;
use crate::pipeline::{CommitOutcome, Committer};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub released: usize,
    pub committed: usize,
    pub empty: usize,
    pub stalled: usize,
    /// Pending votes whose claim had no open journal row.
    pub orphaned_votes: u64,
    pub cleared_in_flight: bool,
}

/// Walks every open journal row and brings it to a terminal stage where it
/// can: claims that never reached the ledger go back to the pool, the rest
/// resume from their last journaled step.
///
/// Must run before the batch trigger starts.
pub async fn recover(committer: &Committer) -> Result<RecoveryReport> {
    let db = committer.db();
    let mut report = RecoveryReport::default();

    let open = db.list_open_commitments().await?;
    if !open.is_empty() {
        info!("Recovering {} open commitments", open.len());
    }

    for record in open {
        info!("Recovering {} from stage {}", record.claim_id, record.stage);

        if record.stage == CommitStage::Claimed {
            let released = db
                .release_claim(&record.claim_id, "released during recovery")
                .await?;
            info!("Released {} votes of {}", released, record.claim_id);
            report.released += 1;
            continue;
        }

        match committer.resume(record).await {
            CommitOutcome::Committed { .. } => report.committed += 1,
            CommitOutcome::Empty { .. } => report.empty += 1,
            CommitOutcome::Released { .. } => report.released += 1,
            CommitOutcome::Stalled {
                claim_id,
                stage,
                reason,
            } => {
                warn!("{} still stalled at {}: {}", claim_id, stage, reason);
                report.stalled += 1;
            }
        }
    }

    report.orphaned_votes = db.release_orphaned_claims().await?;
    if report.orphaned_votes > 0 {
        warn!("Returned {} orphaned votes to the pool", report.orphaned_votes);
    }
    report.cleared_in_flight = db.clear_in_flight_if_idle().await?;

    info!("Recovery finished: {:?}", report);
    Ok(report)
}
