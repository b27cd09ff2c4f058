use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{content_id_for, ContentStore};
use crate::error::ContentError;

/// Keeps blobs in process memory. Used for tests and throwaway deployments.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn publish(&self, blob: &[u8]) -> Result<String, ContentError> {
        let id = content_id_for(blob);
        self.blobs
            .write()
            .await
            .entry(id.clone())
            .or_insert_with(|| blob.to_vec());
        Ok(id)
    }

    async fn fetch(&self, content_id: &str) -> Result<Vec<u8>, ContentError> {
        self.blobs
            .read()
            .await
            .get(content_id)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(content_id.to_string()))
    }
}
