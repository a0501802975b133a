//! Task endpoints.

use axum::{extract::State, Json};
use liquidgate_core::TaskRequest;
use tracing::{info, warn};

use super::Ack;
use crate::gateway::GuardedOperation;
use crate::state::AppState;

/// Admit `operation` under the task guard and acknowledge immediately.
fn admit(state: &AppState, operation: GuardedOperation, request: TaskRequest) -> Ack {
    let id = request.id.clone();
    let gateway = state.gateway.clone();
    let work = async move { gateway.run(operation, &request).await };

    match state.guard.admit(id.clone(), state.reporter.clone(), work) {
        Ok(_) => {
            info!("📥 {} accepted as task {}", operation.name(), id);
            Ack::accepted(id)
        }
        Err(status) => {
            warn!("{} for task {} rejected: device {}", operation.name(), id, status);
            Ack::rejected(id, status)
        }
    }
}

pub async fn set_liquid_handling_info(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Json<Ack> {
    Json(admit(&state, GuardedOperation::Transfer, request))
}

pub async fn discharge_liquid(State(state): State<AppState>, Json(request): Json<TaskRequest>) -> Json<Ack> {
    Json(admit(&state, GuardedOperation::Discharge, request))
}

pub async fn set_solution_exchange_info(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Json<Ack> {
    Json(admit(&state, GuardedOperation::Exchange, request))
}

pub async fn reset_tip_boxes(State(state): State<AppState>, Json(request): Json<TaskRequest>) -> Json<Ack> {
    Json(admit(&state, GuardedOperation::ResetTips, request))
}

// The read and override endpoints answer inline and ignore the busy flag.

pub async fn get_tips_count(State(state): State<AppState>, Json(request): Json<TaskRequest>) -> Json<Ack> {
    let result = state.gateway.tips_count().await.map(Some);
    Json(Ack::from_result(request.id, result))
}

pub async fn get_stock_solution_info(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Json<Ack> {
    let result = state.gateway.stock_solution_info().await.map(Some);
    Json(Ack::from_result(request.id, result))
}

pub async fn set_stock_solution_info(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Json<Ack> {
    let result = state.gateway.set_stock_solution_info(&request).await.map(|_| None);
    Json(Ack::from_result(request.id, result))
}
