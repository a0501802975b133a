//! Planner configuration and the shared planning context.

use std::time::Duration;

use liquidgate_core::{
    BatchRunner, CommandBatch, ContainerSize, ExchangeParams, ExecutionContext, GatewayError,
    PrimitiveOperation, Result, Station,
};
use liquidgate_ledger::{TipLedger, TipSlot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Lids the 4ml lid mechanism can hold at once.
    pub lid_capacity_4ml: u32,

    /// Lids the 20ml lid mechanism can hold at once.
    pub lid_capacity_20ml: u32,

    /// Largest volume a single suck may draw.
    pub suck_ceiling: f64,

    /// Largest number of 4ml targets filled with one tip during a transfer.
    pub transfer_group_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            lid_capacity_4ml: 12,
            lid_capacity_20ml: 8,
            suck_ceiling: 1000.0,
            transfer_group_size: 12,
        }
    }
}

impl PlannerConfig {
    pub fn lid_capacity(&self, size: ContainerSize) -> u32 {
        match size {
            ContainerSize::Ml4 => self.lid_capacity_4ml,
            ContainerSize::Ml20 => self.lid_capacity_20ml,
        }
    }
}

/// Expands liquid-handling requests into command batches.
///
/// Tips are allocated from the ledger while a batch is being built, so a
/// plan that fails halfway leaves the tips it already took consumed.
pub struct OperationPlanner {
    pub(crate) config: PlannerConfig,
    pub(crate) tips: TipLedger,
}

impl OperationPlanner {
    /// Create a planner with the default configuration.
    pub fn new(tips: TipLedger) -> Self {
        Self::with_config(tips, PlannerConfig::default())
    }

    pub fn with_config(tips: TipLedger, config: PlannerConfig) -> Self {
        Self { config, tips }
    }

    /// Empty batch bound to the context's instance and pipeline.
    pub(crate) fn new_batch(ctx: &ExecutionContext) -> Result<CommandBatch> {
        if ctx.instance_id.is_missing() {
            return Err(GatewayError::validation("execution context has no instanceId"));
        }
        Ok(CommandBatch::new(ctx.instance_id.clone(), ctx.pipeline_id.clone()))
    }

    /// Allocate a tip and emit the command that picks it up.
    pub(crate) async fn install_tip(&self, batch: &mut CommandBatch) -> Result<TipSlot> {
        let tip = self.tips.allocate().await?;
        debug!("Batch {} uses tip {}", batch.id, tip.id);
        batch.push(PrimitiveOperation::install_tip(Station::Material, tip.id));
        Ok(tip)
    }

    /// Run discharge then transfer `cycle_count` times, waiting after each cycle.
    ///
    /// The first failing cycle aborts the rest.
    pub async fn exchange(
        &self,
        ctx: &ExecutionContext,
        params: &ExchangeParams,
        runner: &dyn BatchRunner,
    ) -> Result<()> {
        let delay = Duration::try_from_secs_f64(params.delay_secs)
            .map_err(|_| GatewayError::validation(format!("invalid cycle delay {}", params.delay_secs)))?;
        ctx.containers()?;
        Self::new_batch(ctx)?;

        for cycle in 1..=params.cycle_count {
            info!("Exchange cycle {}/{} started", cycle, params.cycle_count);
            self.discharge(ctx, &params.discharge, runner).await?;
            self.transfer(ctx, &params.transfer, runner).await?;
            info!(
                "Exchange cycle {}/{} finished, waiting {:?}",
                cycle, params.cycle_count, delay
            );
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}
