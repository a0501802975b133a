//! Robot arm controller client.

use async_trait::async_trait;
use liquidgate_core::{CommandBatch, ExternalId, GatewayError, PrimitiveOperation, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies this gateway and the arm it drives to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotIdentity {
    /// Machine code sent as `identifyingCode`.
    pub machine_code: String,
    pub robot_id: String,
}

/// Request body for submitting a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub identifying_code: String,
    pub instance_id: ExternalId,
    pub param: Vec<PrimitiveOperation>,
    pub pipeline_id: ExternalId,
    pub robot_id: String,
}

impl SubmitRequest {
    pub fn new(identity: &RobotIdentity, batch: &CommandBatch) -> Self {
        Self {
            identifying_code: identity.machine_code.clone(),
            instance_id: batch.instance_id.clone(),
            param: batch.operations.clone(),
            pipeline_id: batch.pipeline_id.clone(),
            robot_id: identity.robot_id.clone(),
        }
    }
}

/// What the controller reports for a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    /// The lookup answered without a `data` object.
    Missing,
    /// The batch is known but has not reported back yet.
    Pending,
    /// The batch reported back with a result code.
    Finished { code: i64 },
}

impl CallbackState {
    pub fn is_success(&self) -> bool {
        matches!(self, CallbackState::Finished { code: 200 })
    }
}

/// Result code assumed when a callback omits one.
const DEFAULT_CALLBACK_CODE: i64 = 500;

/// Interpret a callback lookup response body.
///
/// `callbackData` is normally a JSON document encoded as a string; an inline
/// object is accepted too.
pub fn parse_callback(body: &serde_json::Value) -> Result<CallbackState> {
    let data = match body.get("data") {
        Some(data) if !data.is_null() => data,
        _ => return Ok(CallbackState::Missing),
    };

    let payload = match data.get("callbackData") {
        None | Some(serde_json::Value::Null) => return Ok(CallbackState::Pending),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => return Ok(CallbackState::Pending),
        Some(serde_json::Value::String(s)) => serde_json::from_str::<serde_json::Value>(s)
            .map_err(|e| GatewayError::Protocol(format!("unreadable callbackData '{}': {}", s, e)))?,
        Some(other) => other.clone(),
    };

    let code = payload
        .get("code")
        .and_then(|c| c.as_i64())
        .unwrap_or(DEFAULT_CALLBACK_CODE);
    Ok(CallbackState::Finished { code })
}

/// Transport to the robot arm controller.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Post one batch. Returns the controller's correlation id.
    ///
    /// Fails on transport errors, non-success statuses, and bodies without
    /// a `data` field; callers decide whether to retry.
    async fn post_batch(&self, request: &SubmitRequest) -> Result<ExternalId>;

    /// Look up the completion state of a correlation id.
    async fn fetch_callback(&self, correlation_id: &ExternalId) -> Result<CallbackState>;
}

/// Client for the controller's HTTP interface.
#[derive(Clone)]
pub struct HttpControllerClient {
    /// Batch submission endpoint.
    command_url: String,

    /// Callback lookup prefix; the correlation id is appended.
    callback_url: String,

    /// HTTP client.
    http_client: reqwest::Client,
}

/// Response from submitting a batch.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl HttpControllerClient {
    pub fn new(command_url: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self::with_client(command_url, callback_url, reqwest::Client::new())
    }

    pub fn with_client(
        command_url: impl Into<String>,
        callback_url: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            command_url: command_url.into(),
            callback_url: callback_url.into(),
            http_client,
        }
    }
}

fn transport(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Transport {
        attempts: 1,
        message: e.to_string(),
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn post_batch(&self, request: &SubmitRequest) -> Result<ExternalId> {
        let response = self
            .http_client
            .post(&self.command_url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(transport(format!("controller answered {}: {}", status, error_text)));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        debug!("Controller accepted batch: {:?}", body.data);

        match body.data {
            Some(id) if !id.is_null() => Ok(ExternalId::new(id)),
            _ => Err(GatewayError::Protocol(
                "submit response carries no correlation id".to_string(),
            )),
        }
    }

    async fn fetch_callback(&self, correlation_id: &ExternalId) -> Result<CallbackState> {
        let url = format!("{}{}", self.callback_url, correlation_id);

        let body: serde_json::Value = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(transport)?
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;

        parse_callback(&body)
    }
}
