//! Controller reachability checks.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::guard::TaskGuard;

pub const CHECK_PERIOD: Duration = Duration::from_secs(60);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Marks the gateway OFFLINE while the controller's TCP port is unreachable.
pub struct LivenessMonitor {
    target: String,
    guard: Arc<TaskGuard>,
}

impl LivenessMonitor {
    pub fn new(target: impl Into<String>, guard: Arc<TaskGuard>) -> Self {
        Self {
            target: target.into(),
            guard,
        }
    }

    /// Check once and record the result on the guard.
    pub async fn check(&self) -> bool {
        let online = matches!(
            timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.target)).await,
            Ok(Ok(_))
        );
        let was_online = self.guard.status() != liquidgate_core::DeviceStatus::Offline;
        if online != was_online {
            if online {
                info!("Controller {} is reachable again", self.target);
            } else {
                warn!("Controller {} is unreachable, gateway is OFFLINE", self.target);
            }
        }
        self.guard.set_online(online);
        online
    }

    pub async fn run(self: Arc<Self>) {
        info!("📡 Checking controller at {} every {:?}", self.target, CHECK_PERIOD);
        let mut ticker = interval(CHECK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.check().await;
        }
    }
}
