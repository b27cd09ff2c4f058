use std::str::FromStr;

use alloy_primitives::B256;
use anyhow::{anyhow, bail, Result};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use tracing::{debug, warn};

use super::models::*;
use super::Database;
use crate::utils::now_rfc3339;

const UPSERT_PROOF_SQL: &str = "INSERT INTO proof_records \
     (voter, choice_id, batch_index, content_id, leaf, proof_path, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT(voter) DO UPDATE SET \
         choice_id = excluded.choice_id, \
         batch_index = excluded.batch_index, \
         content_id = excluded.content_id, \
         leaf = excluded.leaf, \
         proof_path = excluded.proof_path, \
         updated_at = excluded.updated_at \
     WHERE excluded.batch_index >= proof_records.batch_index";

const OPEN_STAGES_SQL: &str = "stage NOT IN ('complete', 'released')";

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {} does not fit in an INTEGER column", value))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("negative value {} in unsigned column", value))
}

/// Pending vote pool
impl Database {
    pub async fn insert_pending_vote(&self, vote: &PendingVote) -> Result<InsertOutcome> {
        debug!("Inserting pending vote for {}", vote.voter);

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO pending_votes (voter, choice_id, signature, received_at) \
             SELECT ?, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM proof_records WHERE voter = ?)",
        )
        .bind(&vote.voter)
        .bind(to_i64(vote.choice_id)?)
        .bind(&vote.signature)
        .bind(now_rfc3339())
        .bind(&vote.voter)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            return Ok(InsertOutcome::Inserted);
        }

        let voted: Option<String> =
            sqlx::query_scalar("SELECT voter FROM proof_records WHERE voter = ?")
                .bind(&vote.voter)
                .fetch_optional(&self.pool)
                .await?;
        Ok(if voted.is_some() {
            InsertOutcome::AlreadyVoted
        } else {
            InsertOutcome::AlreadyPending
        })
    }

    pub async fn count_unclaimed(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_votes WHERE claim_id IS NULL")
                .fetch_one(&self.pool)
                .await?;
        to_u64(count)
    }

    /// Atomically moves the oldest `max_votes` of the open pool into a new
    /// commitment. The rest stay open for the next claim.
    ///
    /// Returns `None` when another commitment is in flight or the pool holds
    /// fewer than `min_votes` votes.
    pub async fn claim_pool(
        &self,
        claim_id: &str,
        min_votes: usize,
        max_votes: usize,
    ) -> Result<Option<Claim>> {
        if max_votes == 0 {
            bail!("claim size limit must be at least 1");
        }

        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE pipeline_state SET in_flight = 1, claim_id = ?, claimed_at = ? \
             WHERE id = 1 AND in_flight = 0 \
             AND (SELECT COUNT(*) FROM pending_votes WHERE claim_id IS NULL) >= ?",
        )
        .bind(claim_id)
        .bind(&now)
        .bind(to_i64(min_votes.max(1) as u64)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Ok(None);
        }

        sqlx::query(
            "UPDATE pending_votes SET claim_id = ? WHERE rowid IN \
             (SELECT rowid FROM pending_votes WHERE claim_id IS NULL ORDER BY rowid LIMIT ?)",
        )
        .bind(claim_id)
        .bind(to_i64(max_votes as u64)?)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query(
            "SELECT voter, choice_id, signature FROM pending_votes \
             WHERE claim_id = ? ORDER BY rowid",
        )
        .bind(claim_id)
        .fetch_all(&mut *tx)
        .await?;
        let votes = rows
            .iter()
            .map(pending_vote_from_row)
            .collect::<Result<Vec<_>>>()?;

        sqlx::query(
            "INSERT INTO commitments (claim_id, stage, votes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(claim_id)
        .bind(CommitStage::Claimed.as_str())
        .bind(serde_json::to_string(&votes)?)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Claimed {} votes under {}", votes.len(), claim_id);
        Ok(Some(Claim {
            claim_id: claim_id.to_string(),
            votes,
        }))
    }

    pub async fn pipeline_status(&self) -> Result<PipelineStatus> {
        let row = sqlx::query("SELECT in_flight, claim_id, claimed_at FROM pipeline_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(PipelineStatus {
            in_flight: row.try_get::<i64, _>("in_flight")? != 0,
            claim_id: row.try_get("claim_id")?,
            claimed_at: row.try_get("claimed_at")?,
        })
    }
}

/// Commitment journal
impl Database {
    pub async fn advance_commitment(
        &self,
        claim_id: &str,
        stage: CommitStage,
        update: CommitmentUpdate,
    ) -> Result<()> {
        debug!("Commitment {} -> {}", claim_id, stage);

        let receipt = update
            .receipt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let batch_index = update.batch_index.map(to_i64).transpose()?;

        let updated = sqlx::query(
            "UPDATE commitments SET stage = ?, \
                 receipt = COALESCE(?, receipt), \
                 batch_index = COALESCE(?, batch_index), \
                 merkle_root = COALESCE(?, merkle_root), \
                 content_id = COALESCE(?, content_id), \
                 error = NULL, updated_at = ? \
             WHERE claim_id = ?",
        )
        .bind(stage.as_str())
        .bind(receipt)
        .bind(batch_index)
        .bind(update.merkle_root.map(|root| root.to_string()))
        .bind(update.content_id)
        .bind(now_rfc3339())
        .bind(claim_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            bail!("no commitment with claim id {}", claim_id);
        }
        Ok(())
    }

    /// Notes why a commitment stopped, leaving its stage untouched.
    pub async fn record_commitment_error(&self, claim_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE commitments SET error = ?, updated_at = ? WHERE claim_id = ?")
            .bind(error)
            .bind(now_rfc3339())
            .bind(claim_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the claimed votes to the open pool. Returns how many moved.
    pub async fn release_claim(&self, claim_id: &str, reason: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE commitments SET stage = ?, error = ?, updated_at = ? WHERE claim_id = ?",
        )
        .bind(CommitStage::Released.as_str())
        .bind(reason)
        .bind(now_rfc3339())
        .bind(claim_id)
        .execute(&mut *tx)
        .await?;

        let released = sqlx::query("UPDATE pending_votes SET claim_id = NULL WHERE claim_id = ?")
            .bind(claim_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        clear_in_flight(&mut tx, claim_id).await?;
        tx.commit().await?;

        Ok(released)
    }

    /// Writes the outcome of a commitment in one transaction: the batch row,
    /// proof records, rejected votes, removal of the claimed votes, journal
    /// completion and clearing the in-flight flag.
    pub async fn finalize_commitment(&self, finalize: &FinalizeBatch) -> Result<()> {
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock from the start.
        let updated = sqlx::query(
            "UPDATE commitments SET stage = ?, error = NULL, updated_at = ? WHERE claim_id = ?",
        )
        .bind(CommitStage::Complete.as_str())
        .bind(&now)
        .bind(&finalize.claim_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            bail!("no commitment with claim id {}", finalize.claim_id);
        }

        if let Some(batch) = &finalize.batch {
            insert_batch(&mut tx, batch).await?;
        }

        for proof in &finalize.proofs {
            upsert_proof(&mut tx, proof).await?;
        }

        sqlx::query("DELETE FROM rejected_votes WHERE claim_id = ?")
            .bind(&finalize.claim_id)
            .execute(&mut *tx)
            .await?;
        for rejected in &finalize.rejected {
            sqlx::query(
                "INSERT INTO rejected_votes (claim_id, voter, reason, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&rejected.claim_id)
            .bind(&rejected.voter)
            .bind(&rejected.reason)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM pending_votes WHERE claim_id = ?")
            .bind(&finalize.claim_id)
            .execute(&mut *tx)
            .await?;

        clear_in_flight(&mut tx, &finalize.claim_id).await?;
        tx.commit().await?;

        Ok(())
    }

    pub async fn get_commitment(&self, claim_id: &str) -> Result<Option<CommitmentRecord>> {
        let row = sqlx::query("SELECT * FROM commitments WHERE claim_id = ?")
            .bind(claim_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(commitment_from_row).transpose()
    }

    /// Commitments neither complete nor released, oldest first.
    pub async fn list_open_commitments(&self) -> Result<Vec<CommitmentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM commitments WHERE {} ORDER BY created_at, rowid",
            OPEN_STAGES_SQL
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(commitment_from_row).collect()
    }

    /// Frees pending votes whose claim id has no open journal row.
    pub async fn release_orphaned_claims(&self) -> Result<u64> {
        let released = sqlx::query(&format!(
            "UPDATE pending_votes SET claim_id = NULL \
             WHERE claim_id IS NOT NULL \
             AND claim_id NOT IN (SELECT claim_id FROM commitments WHERE {})",
            OPEN_STAGES_SQL
        ))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(released)
    }

    /// Clears the in-flight flag when no commitment is open.
    pub async fn clear_in_flight_if_idle(&self) -> Result<bool> {
        let cleared = sqlx::query(&format!(
            "UPDATE pipeline_state SET in_flight = 0, claim_id = NULL, claimed_at = NULL \
             WHERE id = 1 AND in_flight = 1 \
             AND NOT EXISTS (SELECT 1 FROM commitments WHERE {})",
            OPEN_STAGES_SQL
        ))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(cleared > 0)
    }

    pub async fn list_rejected(&self, claim_id: &str) -> Result<Vec<RejectedVoteRecord>> {
        let rows = sqlx::query(
            "SELECT claim_id, voter, reason FROM rejected_votes WHERE claim_id = ? ORDER BY id",
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(RejectedVoteRecord {
                    claim_id: row.try_get("claim_id")?,
                    voter: row.try_get("voter")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }
}

/// Batches and proof records
impl Database {
    pub async fn get_batch(&self, batch_index: u64) -> Result<Option<BatchRecord>> {
        let row = sqlx::query("SELECT * FROM batches WHERE batch_index = ?")
            .bind(to_i64(batch_index)?)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    pub async fn latest_batch(&self) -> Result<Option<BatchRecord>> {
        let row = sqlx::query("SELECT * FROM batches ORDER BY batch_index DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    pub async fn list_batches(&self) -> Result<Vec<BatchRecord>> {
        let rows = sqlx::query("SELECT * FROM batches ORDER BY batch_index")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(batch_from_row).collect()
    }

    pub async fn get_proof_record(&self, voter: &str) -> Result<Option<ProofRecord>> {
        let row = sqlx::query("SELECT * FROM proof_records WHERE voter = ?")
            .bind(voter)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(proof_from_row).transpose()
    }

    pub async fn list_proofs_for_batch(&self, batch_index: u64) -> Result<Vec<ProofRecord>> {
        let rows = sqlx::query("SELECT * FROM proof_records WHERE batch_index = ? ORDER BY voter")
            .bind(to_i64(batch_index)?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(proof_from_row).collect()
    }

    /// Replaces every proof record of a batch with `proofs`.
    pub async fn replace_batch_proofs(&self, batch_index: u64, proofs: &[ProofRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM proof_records WHERE batch_index = ?")
            .bind(to_i64(batch_index)?)
            .execute(&mut *tx)
            .await?;
        for proof in proofs {
            if proof.batch_index != batch_index {
                bail!(
                    "proof for {} targets batch {}, expected {}",
                    proof.voter,
                    proof.batch_index,
                    batch_index
                );
            }
            upsert_proof(&mut tx, proof).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn clear_in_flight(tx: &mut Transaction<'_, Sqlite>, claim_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE pipeline_state SET in_flight = 0, claim_id = NULL, claimed_at = NULL \
         WHERE id = 1 AND claim_id = ?",
    )
    .bind(claim_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_batch(tx: &mut Transaction<'_, Sqlite>, batch: &BatchRecord) -> Result<()> {
    let index = to_i64(batch.batch_index)?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT content_id FROM batches WHERE batch_index = ?")
            .bind(index)
            .fetch_optional(&mut **tx)
            .await?;
    match existing {
        // Same batch written again by a repair run.
        Some(content_id) if content_id == batch.content_id => return Ok(()),
        Some(content_id) => bail!(
            "batch {} already recorded with content {}",
            batch.batch_index,
            content_id
        ),
        None => {}
    }

    let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(batch_index) FROM batches")
        .fetch_one(&mut **tx)
        .await?;
    match latest {
        Some(latest) if index <= latest => bail!(
            "batch index {} is not above latest stored index {}",
            batch.batch_index,
            latest
        ),
        Some(latest) if index > latest + 1 => warn!(
            "batch index gap: storing {} after {}",
            batch.batch_index, latest
        ),
        None if index > 0 => warn!("first stored batch has index {}", batch.batch_index),
        _ => {}
    }

    sqlx::query(
        "INSERT INTO batches (batch_index, merkle_root, content_id, vote_count, claim_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(index)
    .bind(batch.merkle_root.to_string())
    .bind(&batch.content_id)
    .bind(to_i64(batch.vote_count)?)
    .bind(&batch.claim_id)
    .bind(&batch.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_proof(tx: &mut Transaction<'_, Sqlite>, proof: &ProofRecord) -> Result<()> {
    sqlx::query(UPSERT_PROOF_SQL)
        .bind(&proof.voter)
        .bind(to_i64(proof.choice_id)?)
        .bind(to_i64(proof.batch_index)?)
        .bind(&proof.content_id)
        .bind(proof.leaf.to_string())
        .bind(serde_json::to_string(&proof.proof_path)?)
        .bind(&proof.updated_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn parse_b256(value: &str) -> Result<B256> {
    B256::from_str(value).map_err(|e| anyhow!("invalid hash '{}' in database: {}", value, e))
}

fn pending_vote_from_row(row: &SqliteRow) -> Result<PendingVote> {
    Ok(PendingVote {
        voter: row.try_get("voter")?,
        choice_id: to_u64(row.try_get("choice_id")?)?,
        signature: row.try_get("signature")?,
    })
}

fn batch_from_row(row: &SqliteRow) -> Result<BatchRecord> {
    Ok(BatchRecord {
        batch_index: to_u64(row.try_get("batch_index")?)?,
        merkle_root: parse_b256(&row.try_get::<String, _>("merkle_root")?)?,
        content_id: row.try_get("content_id")?,
        vote_count: to_u64(row.try_get("vote_count")?)?,
        claim_id: row.try_get("claim_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn proof_from_row(row: &SqliteRow) -> Result<ProofRecord> {
    let proof_path_json: String = row.try_get("proof_path")?;
    Ok(ProofRecord {
        voter: row.try_get("voter")?,
        choice_id: to_u64(row.try_get("choice_id")?)?,
        batch_index: to_u64(row.try_get("batch_index")?)?,
        content_id: row.try_get("content_id")?,
        leaf: parse_b256(&row.try_get::<String, _>("leaf")?)?,
        proof_path: serde_json::from_str(&proof_path_json)?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn commitment_from_row(row: &SqliteRow) -> Result<CommitmentRecord> {
    let stage: String = row.try_get("stage")?;
    let votes_json: String = row.try_get("votes")?;
    let receipt_json: Option<String> = row.try_get("receipt")?;
    let batch_index: Option<i64> = row.try_get("batch_index")?;
    let merkle_root: Option<String> = row.try_get("merkle_root")?;

    Ok(CommitmentRecord {
        claim_id: row.try_get("claim_id")?,
        stage: CommitStage::from_str(&stage)?,
        votes: serde_json::from_str(&votes_json)?,
        receipt: receipt_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        batch_index: batch_index.map(to_u64).transpose()?,
        merkle_root: merkle_root.as_deref().map(parse_b256).transpose()?,
        content_id: row.try_get("content_id")?,
        error: row.try_get("error")?,
        updated_at: row.try_get("updated_at")?,
    })
}
