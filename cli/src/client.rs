use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

/// Thin HTTP client for the vote service.
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn submit_vote(&self, voter: &str, choice_id: u64, signature: &str) -> Result<Value> {
        let body = json!({ "voter": voter, "choiceId": choice_id, "signature": signature });
        let resp = self
            .http
            .post(format!("{}/vote", self.base_url))
            .json(&body)
            .send()
            .await?;
        Self::into_json(resp).await
    }

    pub async fn validate_vote(&self, voter: &str, choice_id: u64) -> Result<Value> {
        let body = json!({ "voter": voter, "choiceId": choice_id });
        let resp = self
            .http
            .post(format!("{}/validate-vote", self.base_url))
            .json(&body)
            .send()
            .await?;
        Self::into_json(resp).await
    }

    pub async fn batches(&self) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}/batches", self.base_url))
            .send()
            .await?;
        Self::into_json(resp).await
    }

    async fn into_json(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("service returned {status}: {text}"));
        }
        Ok(serde_json::from_str(&text)?)
    }
}
