//! IPFS-backed content store (Kubo RPC API)

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::Deserialize;
use tracing::debug;

use super::ContentStore;
use crate::error::ContentError;

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

pub struct IpfsContentStore {
    client: Client,
    api_url: String,
    gateway_url: Option<String>,
    max_bytes: usize,
}

impl IpfsContentStore {
    pub fn new(api_url: &str, gateway_url: Option<&str>, max_bytes: usize) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.map(|url| url.trim_end_matches('/').to_string()),
            max_bytes,
        })
    }

    async fn read_bounded(&self, mut response: Response) -> Result<Vec<u8>, ContentError> {
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(ContentError::TooLarge(self.max_bytes));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(unavailable)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ContentError::TooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn unavailable(err: reqwest::Error) -> ContentError {
    ContentError::Unavailable(err.to_string())
}

#[async_trait]
impl ContentStore for IpfsContentStore {
    async fn publish(&self, blob: &[u8]) -> Result<String, ContentError> {
        if blob.len() > self.max_bytes {
            return Err(ContentError::TooLarge(self.max_bytes));
        }

        let form = Form::new().part("file", Part::bytes(blob.to_vec()).file_name("batch.json"));
        let response = self
            .client
            .post(format!("{}/api/v0/add?pin=true&cid-version=1", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Unavailable(format!("ipfs add returned {status}")));
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| ContentError::Unavailable(format!("ipfs add response: {e}")))?;
        debug!("Pinned {} bytes as {}", blob.len(), added.hash);
        Ok(added.hash)
    }

    async fn fetch(&self, content_id: &str) -> Result<Vec<u8>, ContentError> {
        if content_id.is_empty() || !content_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ContentError::NotFound(content_id.to_string()));
        }

        let request = match &self.gateway_url {
            Some(gateway) => self.client.get(format!("{gateway}/ipfs/{content_id}")),
            None => self
                .client
                .post(format!("{}/api/v0/cat?arg={content_id}", self.api_url)),
        };
        let response = request.send().await.map_err(unavailable)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ContentError::NotFound(content_id.to_string()));
        }
        if !status.is_success() {
            return Err(ContentError::Unavailable(format!(
                "ipfs fetch of {content_id} returned {status}"
            )));
        }
        self.read_bounded(response).await
    }
}
