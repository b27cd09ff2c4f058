//! Service configuration read from the environment

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use vote_ledger::MAX_BATCH_VOTES;

use crate::database::constants::DEFAULT_DB_PATH;
use crate::utils::{env_opt, env_parse};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CONTENT_DIR: &str = "./content";
pub const DEFAULT_MAX_CONTENT_MB: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerConfig {
    /// In-process reference contract, optionally persisted as JSON.
    Local { state_path: Option<PathBuf> },
    /// Remote ledger relay.
    Http { url: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentConfig {
    Local {
        dir: PathBuf,
    },
    Memory,
    Ipfs {
        api_url: String,
        gateway_url: Option<String>,
    },
}

/// Knobs of the commitment pipeline.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Pool size that triggers a commitment.
    pub batch_threshold: usize,
    /// Most votes a single claim takes from the pool.
    pub max_batch_votes: usize,
    /// Upper bound on any single ledger call.
    pub ledger_timeout: Duration,
    pub confirmation_polls: u32,
    pub confirmation_poll_interval: Duration,
    pub proof_store_retries: u32,
    /// Base delay between proof store attempts and stalled retries.
    pub retry_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_threshold: 1,
            max_batch_votes: MAX_BATCH_VOTES,
            ledger_timeout: Duration::from_secs(30),
            confirmation_polls: 5,
            confirmation_poll_interval: Duration::from_millis(1000),
            proof_store_retries: 5,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    /// Commit any non-empty pool at this interval, even below threshold.
    pub commit_interval: Option<Duration>,
    pub ledger: LedgerConfig,
    pub content: ContentConfig,
    pub max_content_bytes: usize,
    pub metrics_token: Option<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub pipeline: PipelineSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let batch_threshold: usize = env_parse("BATCH_THRESHOLD", 1);
        if batch_threshold == 0 {
            bail!("BATCH_THRESHOLD must be at least 1");
        }
        let max_batch_votes: usize = env_parse("MAX_BATCH_VOTES", MAX_BATCH_VOTES);
        if max_batch_votes == 0 || max_batch_votes > MAX_BATCH_VOTES {
            bail!("MAX_BATCH_VOTES must be between 1 and {}", MAX_BATCH_VOTES);
        }
        if batch_threshold > max_batch_votes {
            bail!(
                "BATCH_THRESHOLD {} exceeds the batch size limit {}",
                batch_threshold,
                max_batch_votes
            );
        }

        let commit_interval = match env_parse::<u64>("COMMIT_INTERVAL_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let ledger = match env_opt("LEDGER_URL") {
            Some(url) => LedgerConfig::Http { url },
            None => LedgerConfig::Local {
                state_path: env_opt("LEDGER_STATE_PATH").map(PathBuf::from),
            },
        };

        let content_kind = env_opt("CONTENT_STORE").unwrap_or_else(|| "local".to_string());
        let content = match content_kind.to_lowercase().as_str() {
            "local" => ContentConfig::Local {
                dir: PathBuf::from(
                    env_opt("CONTENT_DIR").unwrap_or_else(|| DEFAULT_CONTENT_DIR.to_string()),
                ),
            },
            "memory" => ContentConfig::Memory,
            "ipfs" => {
                let Some(api_url) = env_opt("IPFS_API_URL") else {
                    bail!("CONTENT_STORE=ipfs requires IPFS_API_URL");
                };
                ContentConfig::Ipfs {
                    api_url,
                    gateway_url: env_opt("IPFS_GATEWAY_URL"),
                }
            }
            other => bail!("unknown CONTENT_STORE '{}', expected local, memory or ipfs", other),
        };

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            batch_threshold,
            max_batch_votes,
            ledger_timeout: Duration::from_secs(env_parse("LEDGER_TIMEOUT_SECS", 30)),
            confirmation_polls: env_parse("CONFIRMATION_POLLS", defaults.confirmation_polls),
            confirmation_poll_interval: Duration::from_millis(env_parse(
                "CONFIRMATION_POLL_MS",
                1000,
            )),
            proof_store_retries: env_parse("PROOF_STORE_RETRIES", defaults.proof_store_retries),
            retry_backoff: defaults.retry_backoff,
        };

        Ok(Self {
            db_path: env_opt("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            port: env_parse("PORT", DEFAULT_PORT),
            commit_interval,
            ledger,
            content,
            max_content_bytes: env_parse("MAX_CONTENT_MB", DEFAULT_MAX_CONTENT_MB)
                .saturating_mul(1024 * 1024),
            metrics_token: env_opt("METRICS_AUTH_TOKEN"),
            rate_limit_per_second: env_parse("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", 50),
            pipeline,
        })
    }
}
