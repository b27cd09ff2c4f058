//! SQL statement constants for database operations

pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL
)
"#;

pub const CREATE_PENDING_VOTES_TABLE_SQL: &str = r#"
CREATE TABLE pending_votes (
    voter TEXT PRIMARY KEY,
    choice_id INTEGER NOT NULL,
    signature TEXT NOT NULL,
    received_at TEXT NOT NULL,
    claim_id TEXT -- NULL while in the open pool
)
"#;

pub const CREATE_BATCHES_TABLE_SQL: &str = r#"
CREATE TABLE batches (
    batch_index INTEGER PRIMARY KEY,
    merkle_root TEXT NOT NULL,
    content_id TEXT NOT NULL,
    vote_count INTEGER NOT NULL,
    claim_id TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

pub const CREATE_PROOF_RECORDS_TABLE_SQL: &str = r#"
CREATE TABLE proof_records (
    voter TEXT PRIMARY KEY,
    choice_id INTEGER NOT NULL,
    batch_index INTEGER NOT NULL REFERENCES batches(batch_index),
    content_id TEXT NOT NULL,
    leaf TEXT NOT NULL,
    proof_path TEXT NOT NULL, -- array of {position, data}
    updated_at TEXT NOT NULL
)
"#;

pub const CREATE_REJECTED_VOTES_TABLE_SQL: &str = r#"
CREATE TABLE rejected_votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    claim_id TEXT NOT NULL,
    voter TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

pub const CREATE_COMMITMENTS_TABLE_SQL: &str = r#"
CREATE TABLE commitments (
    claim_id TEXT PRIMARY KEY,
    stage TEXT NOT NULL,
    votes TEXT NOT NULL, -- claimed snapshot
    receipt TEXT,
    batch_index INTEGER,
    merkle_root TEXT,
    content_id TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub const CREATE_PIPELINE_STATE_TABLE_SQL: &str = r#"
CREATE TABLE pipeline_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    in_flight INTEGER NOT NULL DEFAULT 0,
    claim_id TEXT,
    claimed_at TEXT
)
"#;

pub const SEED_PIPELINE_STATE_SQL: &str =
    "INSERT OR IGNORE INTO pipeline_state (id, in_flight) VALUES (1, 0)";

pub const CREATE_DB_INDEXES: &[&str] = &[
    "CREATE INDEX idx_pending_claim ON pending_votes(claim_id)",
    "CREATE INDEX idx_proof_batch ON proof_records(batch_index)",
    "CREATE INDEX idx_rejected_claim ON rejected_votes(claim_id)",
    "CREATE INDEX idx_commitments_stage ON commitments(stage)",
];
