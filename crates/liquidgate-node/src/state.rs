//! Application state.

use std::sync::Arc;

use crate::callback::CompletionReporter;
use crate::gateway::Gateway;
use crate::guard::TaskGuard;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Planner, ledger and robot.
    pub gateway: Arc<Gateway>,

    /// Admission and device status.
    pub guard: Arc<TaskGuard>,

    /// Where finished tasks are reported.
    pub reporter: Arc<dyn CompletionReporter>,
}

impl AppState {
    pub fn new(gateway: Gateway, guard: Arc<TaskGuard>, reporter: Arc<dyn CompletionReporter>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            guard,
            reporter,
        }
    }
}
