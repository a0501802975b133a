//! Seam between planning and execution.

use async_trait::async_trait;

use crate::command::CommandBatch;
use crate::error::Result;

/// Runs a command batch to a terminal outcome.
///
/// The planner hands each batch it builds to a runner and waits for the
/// result before planning further; the robot executor is the production
/// implementation.
#[async_trait]
pub trait BatchRunner: Send + Sync {
    /// Submit `batch` and wait until the controller reports it finished.
    async fn run(&self, batch: CommandBatch) -> Result<()>;
}
