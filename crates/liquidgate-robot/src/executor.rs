//! Submit, retry and poll loop for command batches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use liquidgate_core::{BatchRunner, CommandBatch, ExternalId, GatewayError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::{CallbackState, ControllerClient, RobotIdentity, SubmitRequest};
use crate::status::{InstanceStatusSource, FORCED_FAILURE_STATUS};

/// How a batch is handed to the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The whole batch in one submission.
    #[default]
    Batch,
    /// One submission per primitive, each awaited before the next.
    Stepwise,
}

/// Timing of the submit and poll loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Submission attempts before giving up.
    pub submit_attempts: u32,

    /// Wait between two failed submissions, in seconds.
    pub submit_retry_delay_secs: u64,

    /// Wait while the batch is still running or reported a failure, in seconds.
    pub poll_interval_secs: u64,

    /// Wait after a failed or empty lookup, in seconds.
    pub poll_error_delay_secs: u64,

    pub mode: ExecutionMode,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            submit_attempts: 20,
            submit_retry_delay_secs: 5,
            poll_interval_secs: 10,
            poll_error_delay_secs: 5,
            mode: ExecutionMode::Batch,
        }
    }
}

impl ExecutorConfig {
    fn submit_retry_delay(&self) -> Duration {
        Duration::from_secs(self.submit_retry_delay_secs)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn poll_error_delay(&self) -> Duration {
        Duration::from_secs(self.poll_error_delay_secs)
    }
}

/// Runs command batches against the controller.
///
/// A controller that keeps answering with a non-200 code is polled
/// indefinitely; the only way out is the orchestrator forcing the instance
/// to fail.
pub struct Executor {
    client: Arc<dyn ControllerClient>,
    status: Arc<dyn InstanceStatusSource>,
    identity: RobotIdentity,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        client: Arc<dyn ControllerClient>,
        status: Arc<dyn InstanceStatusSource>,
        identity: RobotIdentity,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            status,
            identity,
            config,
        }
    }

    /// Submit `batch`, retrying failed posts. Returns the correlation id.
    ///
    /// Only transport and protocol failures are retried; any other error is
    /// returned as is.
    pub async fn submit(&self, batch: &CommandBatch) -> Result<ExternalId> {
        let request = SubmitRequest::new(&self.identity, batch);
        let attempts = self.config.submit_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client.post_batch(&request).await {
                Ok(correlation_id) => {
                    info!(
                        "Batch {} accepted as {} (attempt {})",
                        batch.id, correlation_id, attempt
                    );
                    return Ok(correlation_id);
                }
                Err(e) if !e.is_transient() => {
                    error!("Batch {} rejected: {}", batch.id, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Submitting batch {} failed (attempt {}/{}): {}",
                        batch.id, attempt, attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.submit_retry_delay()).await;
                    }
                }
            }
        }

        error!("Giving up on batch {} after {} attempts", batch.id, attempts);
        Err(GatewayError::Transport {
            attempts,
            message: last_error,
        })
    }

    /// Poll until the controller reports code 200 or the instance is cancelled.
    pub async fn await_completion(
        &self,
        correlation_id: &ExternalId,
        instance_id: &ExternalId,
    ) -> Result<()> {
        loop {
            match self.status.status(instance_id).await {
                Ok(Some(FORCED_FAILURE_STATUS)) => {
                    warn!("Instance {} was forced to fail, abandoning {}", instance_id, correlation_id);
                    return Err(GatewayError::Cancelled {
                        instance_id: instance_id.to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("Status lookup for instance {} failed: {}", instance_id, e),
            }

            let delay = match self.client.fetch_callback(correlation_id).await {
                Ok(state) if state.is_success() => {
                    info!("Controller finished {}", correlation_id);
                    return Ok(());
                }
                Ok(CallbackState::Finished { code }) => {
                    warn!(
                        "Controller reported code {} for {}, waiting for it to retry",
                        code, correlation_id
                    );
                    self.config.poll_interval()
                }
                Ok(CallbackState::Pending) => {
                    debug!("Waiting for controller callback on {}", correlation_id);
                    self.config.poll_interval()
                }
                Ok(CallbackState::Missing) => {
                    warn!("Callback lookup for {} returned no data", correlation_id);
                    self.config.poll_error_delay()
                }
                Err(e) => {
                    warn!("Callback lookup for {} failed: {}", correlation_id, e);
                    self.config.poll_error_delay()
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_one(&self, batch: &CommandBatch) -> Result<()> {
        debug!("Batch {}: {:?}", batch.id, batch.operations);
        let correlation_id = self.submit(batch).await?;
        self.await_completion(&correlation_id, &batch.instance_id).await
    }

    /// Run `batch` to completion in the configured mode.
    pub async fn execute(&self, batch: CommandBatch) -> Result<()> {
        match self.config.mode {
            ExecutionMode::Batch => self.run_one(&batch).await,
            ExecutionMode::Stepwise => {
                let steps = batch.into_steps();
                let total = steps.len();
                for (i, step) in steps.iter().enumerate() {
                    info!("Step {}/{}: {}", i + 1, total, step.operations[0]);
                    if let Err(e) = self.run_one(step).await {
                        error!("Step {}/{} failed: {}", i + 1, total, e);
                        return Err(e);
                    }
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BatchRunner for Executor {
    async fn run(&self, batch: CommandBatch) -> Result<()> {
        self.execute(batch).await
    }
}
