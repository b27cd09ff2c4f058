//! JSON client for a remote ledger relay
//!
//! The relay exposes the ledger's call contract over HTTP:
//!
//! | Call | Request |
//! |---|---|
//! | submit batch | `POST /batches` `{batchKey, votes}` |
//! | receipt | `GET /batches/{batchKey}` (404 if unknown) |
//! | store root | `POST /roots` `{merkleRoot}` -> `{batchIndex}` |
//! | get root | `GET /roots/{index}` (404 if unknown) -> `{merkleRoot}` |
//! | batch count | `GET /roots` -> `{count}` |

use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use vote_ledger::VoteSubmission;

use super::{Ledger, SubmitReceipt};
use crate::error::LedgerError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBatchRequest<'a> {
    batch_key: B256,
    votes: &'a [VoteSubmission],
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootBody {
    merkle_root: B256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRoot {
    batch_index: u64,
}

#[derive(Deserialize)]
struct BatchCount {
    count: u64,
}

pub struct HttpLedger {
    client: Client,
    base_url: String,
}

impl HttpLedger {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<Response, LedgerError> {
        let response = request
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(LedgerError::Unavailable(format!("relay returned {status}")));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Reverted(format!("{status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    async fn decode_optional<T: DeserializeOwned>(
        response: Response,
    ) -> Result<Option<T>, LedgerError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn submit_batch(
        &self,
        batch_key: B256,
        votes: &[VoteSubmission],
    ) -> Result<SubmitReceipt, LedgerError> {
        debug!("Submitting {} votes to relay under {}", votes.len(), batch_key);
        let request = self
            .client
            .post(self.url("/batches"))
            .json(&SubmitBatchRequest { batch_key, votes });
        Self::decode(Self::send(request).await?).await
    }

    async fn receipt(&self, batch_key: B256) -> Result<Option<SubmitReceipt>, LedgerError> {
        let request = self.client.get(self.url(&format!("/batches/{batch_key}")));
        Self::decode_optional(Self::send(request).await?).await
    }

    async fn store_root(&self, merkle_root: B256) -> Result<u64, LedgerError> {
        let request = self
            .client
            .post(self.url("/roots"))
            .json(&RootBody { merkle_root });
        let stored: StoredRoot = Self::decode(Self::send(request).await?).await?;
        Ok(stored.batch_index)
    }

    async fn get_root(&self, batch_index: u64) -> Result<Option<B256>, LedgerError> {
        let request = self.client.get(self.url(&format!("/roots/{batch_index}")));
        let body: Option<RootBody> = Self::decode_optional(Self::send(request).await?).await?;
        Ok(body.map(|b| b.merkle_root))
    }

    async fn batch_count(&self) -> Result<u64, LedgerError> {
        let request = self.client.get(self.url("/roots"));
        let body: BatchCount = Self::decode(Self::send(request).await?).await?;
        Ok(body.count)
    }
}
