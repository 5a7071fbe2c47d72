//! Label-print collaborator: a small HTTP service driving the label
//! printer. Calls are best-effort; a print failure is reported to the user
//! but never blocks a batch mutation.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelRequest {
    pub batch_id: String,
    pub batch_type: String,
    pub strain: String,
    pub label_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrintOutcome {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrintOutcome {
    pub fn printed(&self) -> bool {
        self.status == "printed"
    }
}

#[async_trait]
pub trait PrintService: Send + Sync {
    async fn print_label(&self, req: &LabelRequest) -> Result<PrintOutcome>;
    async fn health(&self) -> Result<PrintOutcome>;
}

#[derive(Clone)]
pub struct PrintClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for PrintClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrintClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PrintClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid print service base URL")?;
        let http = Client::builder()
            .user_agent("fungihub/0.1")
            .timeout(timeout)
            .build()
            .context("reqwest client")?;
        Ok(Self { http, base_url })
    }

    pub fn build_print_request(&self, req: &LabelRequest) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("print-label")
            .context("invalid print service URL")?;
        self.http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(req)
            .build()
            .context("failed to build print request")
    }
}

#[async_trait]
impl PrintService for PrintClient {
    async fn print_label(&self, req: &LabelRequest) -> Result<PrintOutcome> {
        let request = self.build_print_request(req)?;
        debug!(url = %request.url(), batch_id = %req.batch_id, "sending print request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach print service")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("print service error {}: {}", status, body));
        }
        res.json().await.context("invalid print service response")
    }

    async fn health(&self) -> Result<PrintOutcome> {
        let endpoint = self
            .base_url
            .join("health")
            .context("invalid print service URL")?;
        let res = self
            .http
            .get(endpoint)
            .send()
            .await
            .context("failed to reach print service")?;
        res.json().await.context("invalid print service response")
    }
}
