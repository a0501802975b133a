//! # Liquidgate Core
//!
//! Core types shared by every part of the liquid-handling gateway.
//!
//! This crate provides:
//! - [`PrimitiveOperation`] and [`CommandBatch`] - the controller vocabulary
//! - [`ContainerType`], [`Station`], [`SourceBottle`] - deck addressing
//! - [`TaskRequest`] and the operation parameter payloads
//! - [`BatchRunner`] - the seam the planner executes through
//! - [`GatewayError`] - the error taxonomy

pub mod command;
pub mod error;
pub mod request;
pub mod runner;
pub mod types;

// Re-exports for convenience
pub use command::{
    CommandBatch, DropTarget, ExternalId, Handoff, LidSlot, OperationKind, PrimitiveOperation,
    SlotAddress, SuckSource,
};
pub use error::{GatewayError, Result};
pub use request::{
    Container, DischargeParams, ExchangeParams, ExecutionContext, RackVolumes, SourceDraw,
    StockSolutionUpdate, TaskRequest, TransferParams,
};
pub use runner::BatchRunner;
pub use types::*;
