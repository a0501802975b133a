//! Gateway operations exposed over HTTP.

use std::sync::Arc;

use liquidgate_core::{
    BatchRunner, DischargeParams, ExchangeParams, GatewayError, Result, SolutionClass,
    StockSolutionUpdate, TaskRequest, TransferParams,
};
use liquidgate_ledger::ResourceLedger;
use liquidgate_planner::OperationPlanner;
use serde_json::{json, Value};
use tracing::info;

/// Operations that run in the background under the task guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedOperation {
    Transfer,
    Discharge,
    Exchange,
    ResetTips,
}

impl GuardedOperation {
    pub fn name(&self) -> &'static str {
        match self {
            GuardedOperation::Transfer => "setLiquidHandlingInfo",
            GuardedOperation::Discharge => "dischargeLiquid",
            GuardedOperation::Exchange => "setSolutionExchengeInfo",
            GuardedOperation::ResetTips => "resetTipBoxs",
        }
    }
}

/// Planner, ledger and robot wired together.
pub struct Gateway {
    planner: OperationPlanner,
    ledger: ResourceLedger,
    runner: Arc<dyn BatchRunner>,
}

impl Gateway {
    pub fn new(planner: OperationPlanner, ledger: ResourceLedger, runner: Arc<dyn BatchRunner>) -> Self {
        Self {
            planner,
            ledger,
            runner,
        }
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Run a guarded operation to completion. Returns the completion data.
    pub async fn run(&self, operation: GuardedOperation, request: &TaskRequest) -> Result<Option<Value>> {
        info!("Running {} for task {}", operation.name(), request.id);
        match operation {
            GuardedOperation::Transfer => self.set_liquid_handling_info(request).await?,
            GuardedOperation::Discharge => self.discharge_liquid(request).await?,
            GuardedOperation::Exchange => self.set_solution_exchange_info(request).await?,
            GuardedOperation::ResetTips => self.reset_tips().await?,
        }
        Ok(None)
    }

    /// Fill the context's containers from their stock bottles.
    pub async fn set_liquid_handling_info(&self, request: &TaskRequest) -> Result<()> {
        let ctx = request.require_context()?;
        let params: TransferParams = request.parse_params()?;
        self.planner.transfer(ctx, &params, self.runner.as_ref()).await
    }

    /// Drain the context's containers to waste.
    pub async fn discharge_liquid(&self, request: &TaskRequest) -> Result<()> {
        let ctx = request.require_context()?;
        let params: DischargeParams = request.parse_params()?;
        self.planner.discharge(ctx, &params, self.runner.as_ref()).await
    }

    /// Repeated discharge and refill.
    pub async fn set_solution_exchange_info(&self, request: &TaskRequest) -> Result<()> {
        let ctx = request.require_context()?;
        let params: ExchangeParams = request.parse_params()?;
        self.planner.exchange(ctx, &params, self.runner.as_ref()).await
    }

    pub async fn reset_tips(&self) -> Result<()> {
        self.ledger.tips.reset().await
    }

    /// `{tipsCount, tipsTotal}`.
    pub async fn tips_count(&self) -> Result<Value> {
        Ok(json!({
            "tipsCount": self.ledger.tips.remaining_count().await?,
            "tipsTotal": self.ledger.tips.total_count().await?,
        }))
    }

    /// Fill fraction of every reservoir, keyed by class.
    pub async fn stock_solution_info(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.ledger.solutions.levels().await?)?)
    }

    /// Set one reservoir from a fill fraction.
    pub async fn set_stock_solution_info(&self, request: &TaskRequest) -> Result<()> {
        let update: StockSolutionUpdate = request.parse_params()?;
        if !(0.0..=1.0).contains(&update.value) {
            return Err(GatewayError::validation(format!(
                "fill fraction {} outside 0..=1",
                update.value
            )));
        }
        let class = SolutionClass::from_code(update.stock_solution_type).ok_or_else(|| {
            GatewayError::validation(format!(
                "unknown stock solution type {}",
                update.stock_solution_type
            ))
        })?;
        self.ledger
            .solutions
            .set_volume(class, update.location, update.value * class.capacity())
            .await
    }
}
