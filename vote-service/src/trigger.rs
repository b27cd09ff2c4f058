//! Batch trigger
//!
//! A single task owns the decision of when to commit. Ingestion only sends it
//! a notification; the claim itself is a conditional update in the database,
//! so at most one commitment is in flight even across processes sharing a
//! database file.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::pipeline::{CommitOutcome, Committer};
use crate::utils::backoff;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const OUTCOME_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub enum TriggerEvent {
    VoteInserted,
    /// Periodic fallback: commit any non-empty pool.
    Tick,
    CommitFinished(CommitOutcome),
    /// Resume a stalled commitment or re-claim a released pool.
    Retry,
    Shutdown,
}

/// Sending side of the trigger, cheap to clone into request handlers.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<TriggerEvent>,
    outcomes: broadcast::Sender<CommitOutcome>,
}

impl TriggerHandle {
    /// Never waits. A full channel already holds a pending check.
    pub fn notify_vote(&self) {
        match self.tx.try_send(TriggerEvent::VoteInserted) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Trigger channel full, check already pending")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("Batch trigger is not running"),
        }
    }

    pub async fn shutdown(&self) {
        if self.tx.send(TriggerEvent::Shutdown).await.is_err() {
            debug!("Batch trigger already stopped");
        }
    }

    /// Outcomes of every commitment finished after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CommitOutcome> {
        self.outcomes.subscribe()
    }
}

pub struct BatchTrigger {
    db: Database,
    committer: Arc<Committer>,
    threshold: usize,
    max_batch_votes: usize,
    retry_delay: Duration,
    tx: mpsc::Sender<TriggerEvent>,
    outcomes: broadcast::Sender<CommitOutcome>,
    in_flight: Option<JoinHandle<()>>,
    /// Consecutive stalled or released outcomes.
    failed_attempts: u32,
    /// Set while a scheduled retry is pending; no new claims until it fires.
    backing_off: bool,
}

impl BatchTrigger {
    pub fn spawn(
        committer: Arc<Committer>,
        threshold: usize,
        commit_interval: Option<Duration>,
        retry_delay: Duration,
    ) -> (TriggerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);

        let max_batch_votes = committer.settings().max_batch_votes.max(1);
        let trigger = BatchTrigger {
            db: committer.db().clone(),
            committer,
            threshold: threshold.clamp(1, max_batch_votes),
            max_batch_votes,
            retry_delay,
            tx: tx.clone(),
            outcomes: outcomes.clone(),
            in_flight: None,
            failed_attempts: 0,
            backing_off: false,
        };
        let task = tokio::spawn(trigger.run(rx, commit_interval));

        // Pick up a pool left over from a previous run and any stalled claim.
        if tx.try_send(TriggerEvent::Retry).is_err() {
            warn!("Could not queue the startup check");
        }

        (TriggerHandle { tx, outcomes }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<TriggerEvent>, commit_interval: Option<Duration>) {
        info!(
            "Batch trigger started (threshold {}, interval {:?})",
            self.threshold, commit_interval
        );
        let mut ticker = commit_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            let event = tokio::select! {
                event = rx.recv() => event.unwrap_or(TriggerEvent::Shutdown),
                _ = next_tick(&mut ticker) => TriggerEvent::Tick,
            };

            match event {
                TriggerEvent::VoteInserted => self.try_commit(self.threshold).await,
                TriggerEvent::Tick => self.try_commit(1).await,
                TriggerEvent::CommitFinished(outcome) => self.finished(outcome).await,
                TriggerEvent::Retry => self.retry().await,
                TriggerEvent::Shutdown => break,
            }
        }

        if let Some(task) = self.in_flight.take() {
            info!("Waiting for the in-flight commitment before stopping");
            if let Err(e) = task.await {
                error!("Commitment task failed: {}", e);
            }
        }
        info!("Batch trigger stopped");
    }

    async fn try_commit(&mut self, min_votes: usize) {
        if self.in_flight.is_some() || self.backing_off {
            return;
        }

        let claim_id = Uuid::new_v4().simple().to_string();
        match self
            .db
            .claim_pool(&claim_id, min_votes, self.max_batch_votes)
            .await
        {
            Ok(Some(claim)) => {
                let committer = self.committer.clone();
                let tx = self.tx.clone();
                self.in_flight = Some(tokio::spawn(async move {
                    let outcome = committer.commit_claim(claim).await;
                    if tx.send(TriggerEvent::CommitFinished(outcome)).await.is_err() {
                        warn!("Batch trigger stopped before the commitment finished");
                    }
                }));
            }
            Ok(None) => debug!("Nothing to claim (need {} votes)", min_votes),
            Err(e) => error!("Failed to claim the pending pool: {}", e),
        }
    }

    async fn finished(&mut self, outcome: CommitOutcome) {
        if let Some(task) = self.in_flight.take() {
            // The task sent its outcome as its last step.
            let _ = task.await;
        }

        let failed = matches!(
            outcome,
            CommitOutcome::Stalled { .. } | CommitOutcome::Released { .. }
        );
        // No receivers is fine.
        let _ = self.outcomes.send(outcome);

        if failed {
            self.schedule_retry();
            return;
        }

        self.failed_attempts = 0;
        // Votes that arrived meanwhile may already fill the next batch.
        self.try_commit(self.threshold).await;
    }

    fn schedule_retry(&mut self) {
        let delay = backoff(self.retry_delay, self.failed_attempts);
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.backing_off = true;
        info!(
            "Retrying commitment in {:?} (attempt {})",
            delay, self.failed_attempts
        );

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TriggerEvent::Retry).await;
        });
    }

    async fn retry(&mut self) {
        self.backing_off = false;
        if self.in_flight.is_some() {
            return;
        }

        let status = match self.db.pipeline_status().await {
            Ok(status) => status,
            Err(e) => {
                error!("Failed to read pipeline state: {}", e);
                return;
            }
        };

        let open = match &status.claim_id {
            Some(claim_id) if status.in_flight => match self.db.get_commitment(claim_id).await {
                Ok(record) => record.filter(|record| record.stage.is_open()),
                Err(e) => {
                    error!("Failed to load commitment {}: {}", claim_id, e);
                    return;
                }
            },
            _ => None,
        };

        match open {
            Some(record) => {
                info!("Resuming {} from stage {}", record.claim_id, record.stage);
                let committer = self.committer.clone();
                let tx = self.tx.clone();
                self.in_flight = Some(tokio::spawn(async move {
                    let outcome = committer.resume(record).await;
                    let _ = tx.send(TriggerEvent::CommitFinished(outcome)).await;
                }));
            }
            None => {
                if let Err(e) = self.db.clear_in_flight_if_idle().await {
                    error!("Failed to clear the in-flight flag: {}", e);
                }
                self.try_commit(self.threshold).await;
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
