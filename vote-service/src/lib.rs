//! Vote batch commitment service
//!
//! Votes land in a persisted pending pool. The batch trigger claims the pool
//! once it reaches the configured threshold and hands it to the pipeline,
//! which submits it to the ledger, anchors the accepted set as a Merkle root
//! plus content-addressed blob, and stores one proof record per voter. The
//! verifier later checks a voter's claim against the anchored content and
//! the ledger root alone.

pub mod anchor;
pub mod auth_middleware;
pub mod config;
pub mod content;
pub mod database;
pub mod error;
pub mod indexer;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod recovery;
pub mod routes;
pub mod state;
pub mod trigger;
pub mod types;
pub mod utils;
pub mod verifier;

pub use pipeline::{CommitOutcome, Committer};
pub use trigger::{BatchTrigger, TriggerHandle};
pub use verifier::{ProofVerifier, Verdict, VerificationReport};
