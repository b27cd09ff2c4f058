use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;
use serde_json::{json, Value};

use crate::verifier::Verdict;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IngestOutcome {
    Accepted,
    Malformed,
    Duplicate,
    Internal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CommitKind {
    Committed,
    Empty,
    Released,
    Stalled,
}

#[derive(Default)]
pub struct Metrics {
    ingest_total: HashMap<IngestOutcome, u64>,
    commit_total: HashMap<CommitKind, u64>,
    verdict_total: HashMap<Verdict, u64>,
    votes_committed_total: u64,
    votes_rejected_total: u64,
    malformed_in_batch_total: u64,
    verify_unavailable_total: u64,
}

static METRICS: OnceCell<Mutex<Metrics>> = OnceCell::new();

fn get() -> MutexGuard<'static, Metrics> {
    METRICS
        .get_or_init(|| Mutex::new(Metrics::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

pub fn record_ingest(outcome: IngestOutcome) {
    *get().ingest_total.entry(outcome).or_insert(0) += 1;
}

pub fn record_commit(kind: CommitKind) {
    *get().commit_total.entry(kind).or_insert(0) += 1;
}

/// Votes partitioned by a finished commitment.
pub fn record_partition(accepted: usize, ledger_rejected: usize, malformed: usize) {
    let mut m = get();
    m.votes_committed_total += accepted as u64;
    m.votes_rejected_total += ledger_rejected as u64;
    m.malformed_in_batch_total += malformed as u64;
}

pub fn record_verdict(verdict: Verdict) {
    *get().verdict_total.entry(verdict).or_insert(0) += 1;
}

pub fn record_verify_unavailable() {
    get().verify_unavailable_total += 1;
}

pub fn snapshot_as_json(db_path: &str) -> Value {
    let m = get();

    let ingest: Vec<Value> = m
        .ingest_total
        .iter()
        .map(|(outcome, count)| {
            json!({
                "outcome": match outcome {
                    IngestOutcome::Accepted => "accepted",
                    IngestOutcome::Malformed => "malformed",
                    IngestOutcome::Duplicate => "duplicate",
                    IngestOutcome::Internal => "internal",
                },
                "count": count
            })
        })
        .collect();

    let commits: Vec<Value> = m
        .commit_total
        .iter()
        .map(|(kind, count)| {
            json!({
                "outcome": match kind {
                    CommitKind::Committed => "committed",
                    CommitKind::Empty => "empty",
                    CommitKind::Released => "released",
                    CommitKind::Stalled => "stalled",
                },
                "count": count
            })
        })
        .collect();

    let verdicts: Vec<Value> = m
        .verdict_total
        .iter()
        .map(|(verdict, count)| json!({ "verdict": verdict.as_str(), "count": count }))
        .collect();

    let db_mb = storage_db_bytes(db_path).map(|b| round2(bytes_to_mb(b)));
    let fs_free_mb = filesystem_free_mb(db_path);

    json!({
        "ingest_total": ingest,
        "commit_total": commits,
        "verdict_total": verdicts,
        "votes_committed_total": m.votes_committed_total,
        "votes_rejected_total": m.votes_rejected_total,
        "malformed_in_batch_total": m.malformed_in_batch_total,
        "verify_unavailable_total": m.verify_unavailable_total,
        "storage": {
            "db_path": db_path,
            "db_size_mb": db_mb,
            "free_storage_mb": fs_free_mb,
        }
    })
}

fn storage_db_bytes(db_path: &str) -> Option<u64> {
    std::fs::metadata(db_path)
        .ok()
        .and_then(|m| if m.is_file() { Some(m.len()) } else { None })
}

fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = 1024.0 * 1024.0;
    (bytes as f64) / mb
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn filesystem_free_mb(db_path: &str) -> Option<f64> {
    use sysinfo::Disks;
    let disks = Disks::new_with_refreshed_list();
    let path = std::path::Path::new(db_path);
    let mount = path.canonicalize().ok().and_then(|p| {
        disks
            .iter()
            .filter(|d| p.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
    });

    mount.map(|d| round2(bytes_to_mb(d.available_space())))
}
