//! Completion callbacks to the orchestration system.

use async_trait::async_trait;
use liquidgate_core::ExternalId;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Attempts per callback endpoint.
pub const CALLBACK_ATTEMPTS: u32 = 10;

/// Outcome of one admitted task, as reported to the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub id: ExternalId,
    pub code: i64,
    pub is_robot: bool,
    /// Milliseconds since the Unix epoch.
    pub stamp: i64,
    pub msg: String,
    pub vars: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Completion {
    pub fn success(id: ExternalId, data: Option<serde_json::Value>) -> Self {
        Self::new(id, 200, "operation succeeded".to_string(), data)
    }

    pub fn failure(id: ExternalId, msg: String) -> Self {
        Self::new(id, 500, msg, None)
    }

    fn new(id: ExternalId, code: i64, msg: String, data: Option<serde_json::Value>) -> Self {
        Self {
            id,
            code,
            is_robot: false,
            stamp: chrono::Utc::now().timestamp_millis(),
            msg,
            vars: None,
            data,
        }
    }
}

/// Receives task outcomes.
#[async_trait]
pub trait CompletionReporter: Send + Sync {
    /// Deliver `completion`. Delivery failures are logged, never returned.
    async fn report(&self, completion: &Completion);
}

#[derive(Debug, Deserialize)]
struct CallbackAck {
    #[serde(default)]
    code: Option<i64>,
}

/// Posts completions to the configured callback endpoints.
#[derive(Clone)]
pub struct HttpCompletionReporter {
    urls: Vec<String>,
    attempts: u32,
    http_client: reqwest::Client,
}

impl HttpCompletionReporter {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            attempts: CALLBACK_ATTEMPTS,
            http_client: reqwest::Client::new(),
        }
    }

    /// Post to one endpoint until it acknowledges with `code == 200`.
    async fn deliver(&self, url: &str, completion: &Completion) -> bool {
        for attempt in 1..=self.attempts {
            let response = match self.http_client.post(url).json(completion).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Callback to {} failed (attempt {}): {}", url, attempt, e);
                    continue;
                }
            };
            match response.json::<CallbackAck>().await {
                Ok(CallbackAck { code: Some(200) }) => return true,
                Ok(ack) => warn!("Callback to {} answered code {:?} (attempt {})", url, ack.code, attempt),
                Err(e) => warn!("Callback to {} returned unreadable body (attempt {}): {}", url, attempt, e),
            }
        }
        false
    }
}

#[async_trait]
impl CompletionReporter for HttpCompletionReporter {
    async fn report(&self, completion: &Completion) {
        for url in &self.urls {
            if self.deliver(url, completion).await {
                info!("Task {} reported to {} with code {}", completion.id, url, completion.code);
            } else {
                error!(
                    "Giving up on callback for task {} to {} after {} attempts",
                    completion.id, url, self.attempts
                );
            }
        }
    }
}

/// Reporter used when HTTP callbacks are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyReporter;

#[async_trait]
impl CompletionReporter for LogOnlyReporter {
    async fn report(&self, completion: &Completion) {
        info!(
            "Task {} completed with code {}: {}",
            completion.id, completion.code, completion.msg
        );
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_completion_wire_shape() {
        let ok = serde_json::to_value(Completion::success(ExternalId::new(7), None)).unwrap();
        assert_eq!(ok["id"], 7);
        assert_eq!(ok["code"], 200);
        assert_eq!(ok["isRobot"], false);
        assert!(ok["vars"].is_null());
        assert!(ok.get("data").is_none());
        assert!(ok["stamp"].as_i64().unwrap() > 0);

        let data = serde_json::json!({"tipsCount": 3});
        let with_data = serde_json::to_value(Completion::success(ExternalId::new("t"), Some(data))).unwrap();
        assert_eq!(with_data["data"]["tipsCount"], 3);

        let failed = serde_json::to_value(Completion::failure(ExternalId::new(7), "boom".into())).unwrap();
        assert_eq!(failed["code"], 500);
        assert_eq!(failed["msg"], "boom");
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/callback", addr)
    }

    #[tokio::test]
    async fn test_retries_until_acknowledged() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/callback",
            post(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    let code = if n < 3 { 500 } else { 200 };
                    Json(serde_json::json!({ "code": code }))
                }
            }),
        );
        let url = serve(router).await;

        let reporter = HttpCompletionReporter::new(vec![url]);
        reporter.report(&Completion::success(ExternalId::new(1), None)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_ten_attempts() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/callback",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({ "code": 500 }))
                }
            }),
        );
        let url = serve(router).await;

        let reporter = HttpCompletionReporter::new(vec![url]);
        reporter.report(&Completion::failure(ExternalId::new(1), "x".into())).await;
        assert_eq!(hits.load(Ordering::SeqCst), CALLBACK_ATTEMPTS);
    }
}
