//! HTTP handlers.
//!
//! Every task endpoint answers HTTP 200; the outcome is carried in the
//! body's `code`.

pub mod health;
pub mod operate;

use liquidgate_core::{DeviceStatus, ExternalId};
use serde::Serialize;

const SUCCESS_MESSAGE: &str = "operation succeeded";

/// Acknowledgement body of a task endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub id: ExternalId,
    pub stamp: i64,
    pub message: String,
    pub msg: String,
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Ack {
    fn new(id: ExternalId, code: i64, message: String, data: Option<serde_json::Value>) -> Self {
        Self {
            id,
            stamp: chrono::Utc::now().timestamp_millis(),
            msg: message.clone(),
            message,
            code,
            data,
        }
    }

    /// The task was admitted and runs in the background.
    pub fn accepted(id: ExternalId) -> Self {
        Self::new(id, 200, SUCCESS_MESSAGE.to_string(), None)
    }

    /// The gateway was not idle.
    pub fn rejected(id: ExternalId, status: DeviceStatus) -> Self {
        Self::new(id, 500, format!("DEVICE {}", status), None)
    }

    /// Outcome of a synchronous operation.
    pub fn from_result(id: ExternalId, result: liquidgate_core::Result<Option<serde_json::Value>>) -> Self {
        match result {
            Ok(data) => Self::new(id, 200, SUCCESS_MESSAGE.to_string(), data),
            Err(e) => Self::new(id, 500, e.to_string(), None),
        }
    }
}
