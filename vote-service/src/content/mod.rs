//! Content-addressed storage for anchored batch blobs

pub mod ipfs;
pub mod local;
pub mod memory;

use std::sync::Arc;

use alloy_primitives::keccak256;
use async_trait::async_trait;

use crate::config::ContentConfig;
use crate::error::ContentError;

pub use ipfs::IpfsContentStore;
pub use local::LocalContentStore;
pub use memory::MemoryContentStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `blob` and returns its content identifier. Publishing the same
    /// bytes twice yields the same identifier.
    async fn publish(&self, blob: &[u8]) -> Result<String, ContentError>;

    async fn fetch(&self, content_id: &str) -> Result<Vec<u8>, ContentError>;
}

/// Identifier used by the local and memory stores: bare hex keccak-256.
pub fn content_id_for(blob: &[u8]) -> String {
    hex::encode(keccak256(blob))
}

pub fn is_keccak_content_id(content_id: &str) -> bool {
    content_id.len() == 64 && content_id.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn build_store(
    config: &ContentConfig,
    max_content_bytes: usize,
) -> anyhow::Result<Arc<dyn ContentStore>> {
    Ok(match config {
        ContentConfig::Local { dir } => Arc::new(LocalContentStore::new(dir, max_content_bytes)?),
        ContentConfig::Memory => Arc::new(MemoryContentStore::new()),
        ContentConfig::Ipfs {
            api_url,
            gateway_url,
        } => Arc::new(IpfsContentStore::new(
            api_url,
            gateway_url.as_deref(),
            max_content_bytes,
        )?),
    })
}
