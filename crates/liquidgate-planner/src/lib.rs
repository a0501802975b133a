//! # Liquidgate Planner
//!
//! Expands liquid-handling requests into ordered robot command batches.
//!
//! - [`OperationPlanner::discharge`] drains sample containers to waste
//! - [`OperationPlanner::transfer`] fills containers from stock bottles,
//!   one batch per bottle
//! - [`OperationPlanner::exchange`] repeats both for a number of cycles

pub mod discharge;
pub mod lids;
pub mod planner;
pub mod transfer;
pub mod volume;

pub use planner::{OperationPlanner, PlannerConfig};
pub use transfer::{group_by_bottle, BottleWork, TransferTarget};
pub use volume::chunk_volume;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use liquidgate_core::{BatchRunner, CommandBatch, ExecutionContext, GatewayError, Result};
    use liquidgate_ledger::{InMemorySnapshotStore, TipLedger};
    use serde_json::json;

    use crate::OperationPlanner;

    /// Records every batch it is asked to run.
    #[derive(Default)]
    pub struct RecordingRunner {
        batches: Mutex<Vec<CommandBatch>>,
        fail_at: Option<usize>,
    }

    impl RecordingRunner {
        /// Fails the `n`th batch (0-based) with a transport error.
        pub fn failing_at(n: usize) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail_at: Some(n),
            }
        }

        pub fn batches(&self) -> Vec<CommandBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchRunner for RecordingRunner {
        async fn run(&self, batch: CommandBatch) -> Result<()> {
            let mut batches = self.batches.lock().unwrap();
            let index = batches.len();
            batches.push(batch);
            if self.fail_at == Some(index) {
                return Err(GatewayError::Transport {
                    attempts: 20,
                    message: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    pub async fn planner() -> (OperationPlanner, TipLedger) {
        let tips = TipLedger::open(Arc::new(InMemorySnapshotStore::new())).await.unwrap();
        (OperationPlanner::new(tips.clone()), tips)
    }

    /// Context for instance 20 / pipeline 10 holding `entries` as one group.
    pub fn context(entries: serde_json::Value) -> ExecutionContext {
        serde_json::from_value(json!({
            "pipelineId": 10,
            "instanceId": 20,
            "containers": [{"containers": entries}]
        }))
        .unwrap()
    }
}
