//! Shared application state

use std::sync::Arc;

use crate::database::Database;
use crate::pipeline::Committer;
use crate::trigger::TriggerHandle;
use crate::verifier::ProofVerifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub db_path: String,
    pub committer: Arc<Committer>,
    pub verifier: ProofVerifier,
    pub trigger: TriggerHandle,
    pub batch_threshold: usize,
    /// Enables `/admin/*` when set.
    pub metrics_token: Option<String>,
}
