//! Instance status lookups used for external cancellation.

use async_trait::async_trait;
use liquidgate_core::{ExternalId, GatewayError, Result};
use serde::Deserialize;

/// Status the orchestrator writes when it forces an instance to fail.
pub const FORCED_FAILURE_STATUS: i64 = 260;

/// Source of orchestrator-side instance statuses.
#[async_trait]
pub trait InstanceStatusSource: Send + Sync {
    /// Current status of `instance_id`, or `None` if unknown.
    async fn status(&self, instance_id: &ExternalId) -> Result<Option<i64>>;
}

/// Looks statuses up over HTTP: `GET <url><instance_id>` → `{"data": <int>}`.
#[derive(Clone)]
pub struct HttpInstanceStatus {
    url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    data: Option<i64>,
}

impl HttpInstanceStatus {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InstanceStatusSource for HttpInstanceStatus {
    async fn status(&self, instance_id: &ExternalId) -> Result<Option<i64>> {
        let url = format!("{}{}", self.url, instance_id);
        let response: StatusResponse = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                attempts: 1,
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        Ok(response.data)
    }
}

/// Status source for deployments without an orchestrator status endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCancellation;

#[async_trait]
impl InstanceStatusSource for NoCancellation {
    async fn status(&self, _instance_id: &ExternalId) -> Result<Option<i64>> {
        Ok(None)
    }
}
