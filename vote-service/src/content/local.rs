use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{content_id_for, is_keccak_content_id, ContentStore};
use crate::database::path::validate_content_dir;
use crate::error::ContentError;

/// Stores each blob as `<dir>/<hex keccak-256>`.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl LocalContentStore {
    pub fn new(dir: &Path, max_bytes: usize) -> anyhow::Result<Self> {
        validate_content_dir(dir)?;
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            max_bytes,
        })
    }

    fn blob_path(&self, content_id: &str) -> Result<PathBuf, ContentError> {
        // Identifiers become file names, so only accept the exact hash shape.
        if !is_keccak_content_id(content_id) {
            return Err(ContentError::NotFound(content_id.to_string()));
        }
        Ok(self.dir.join(content_id.to_ascii_lowercase()))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn publish(&self, blob: &[u8]) -> Result<String, ContentError> {
        if blob.len() > self.max_bytes {
            return Err(ContentError::TooLarge(self.max_bytes));
        }

        let id = content_id_for(blob);
        let path = self.blob_path(&id)?;
        if tokio::fs::try_exists(&path).await? {
            debug!("Content {} already stored", id);
            return Ok(id);
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Stored content {} ({} bytes)", id, blob.len());
        Ok(id)
    }

    async fn fetch(&self, content_id: &str) -> Result<Vec<u8>, ContentError> {
        let path = self.blob_path(content_id)?;

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentError::NotFound(content_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if meta.len() > self.max_bytes as u64 {
            return Err(ContentError::TooLarge(self.max_bytes));
        }

        let blob = tokio::fs::read(&path).await?;
        if content_id_for(&blob) != content_id.to_ascii_lowercase() {
            return Err(ContentError::Corrupt(content_id.to_string()));
        }
        Ok(blob)
    }
}
