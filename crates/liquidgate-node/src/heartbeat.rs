//! Periodic status reports to the orchestrator.

use std::sync::Arc;

use liquidgate_core::DeviceStatus;
use serde::Serialize;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::GatewayConfig;
use crate::guard::TaskGuard;

/// Body of one heartbeat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub ip: String,
    pub port: u16,
    pub uri: String,
    pub stamp: i64,
    pub identifying_code: String,
    pub status: DeviceStatus,
}

/// Number of beats between two info-level log lines.
const LOG_EVERY: u64 = 5;

/// Posts the gateway status to every heartbeat endpoint on a fixed period.
pub struct HeartbeatReporter {
    /// `(url, identifying code)` pairs.
    targets: Vec<(String, String)>,
    ip: String,
    port: u16,
    uri: String,
    period: Duration,
    guard: Arc<TaskGuard>,
    http_client: reqwest::Client,
}

impl HeartbeatReporter {
    pub fn new(config: &GatewayConfig, guard: Arc<TaskGuard>) -> Self {
        Self {
            targets: config.heartbeat_targets(),
            ip: config.ip_address.clone(),
            port: config.port,
            uri: config.uri.clone(),
            period: config.heartbeat_interval(),
            guard,
            http_client: reqwest::Client::new(),
        }
    }

    /// The heartbeat for `identifying_code` at the current status.
    pub fn heartbeat(&self, identifying_code: &str) -> Heartbeat {
        Heartbeat {
            ip: self.ip.clone(),
            port: self.port,
            uri: self.uri.clone(),
            stamp: chrono::Utc::now().timestamp_millis(),
            identifying_code: identifying_code.to_string(),
            status: self.guard.status(),
        }
    }

    /// Send one heartbeat to every target. Returns how many were accepted.
    pub async fn beat_once(&self) -> usize {
        let mut accepted = 0;
        for (url, code) in &self.targets {
            let body = self.heartbeat(code);
            let result = self
                .http_client
                .post(url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => accepted += 1,
                Err(e) => error!("Heartbeat to {} failed: {}", url, e),
            }
        }
        accepted
    }

    /// Beat forever.
    pub async fn run(self: Arc<Self>) {
        if self.targets.is_empty() {
            info!("No heartbeat endpoints configured");
            return;
        }
        info!("💓 Heartbeat every {:?} to {} endpoint(s)", self.period, self.targets.len());

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beats: u64 = 0;
        loop {
            ticker.tick().await;
            self.beat_once().await;
            if beats % LOG_EVERY == 0 {
                info!("Gateway status is {}", self.guard.status());
            } else {
                debug!("Heartbeat sent, status {}", self.guard.status());
            }
            beats = beats.wrapping_add(1);
        }
    }
}
