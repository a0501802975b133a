//! # Liquidgate Robot
//!
//! Client and executor for the robot arm controller's asynchronous command
//! protocol: a batch is posted, the controller answers with a correlation
//! id, and completion is polled for until the controller reports success or
//! the orchestrator forces the owning instance to fail.

pub mod client;
pub mod executor;
pub mod status;

pub use client::{CallbackState, ControllerClient, HttpControllerClient, RobotIdentity, SubmitRequest};
pub use executor::{ExecutionMode, Executor, ExecutorConfig};
pub use status::{HttpInstanceStatus, InstanceStatusSource, NoCancellation, FORCED_FAILURE_STATUS};
