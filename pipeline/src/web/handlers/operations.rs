// Run lease inspection and manual release

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::{error, info};

use super::common::{api_error, ApiResponse, ApiResult};
use crate::operation_tracker::LeaseStatus;
use crate::web::AppState;

pub async fn get_active_operations(State(state): State<AppState>) -> ApiResult<LeaseStatus> {
    match state.leases.status().await {
        Ok(status) => Ok(Json(ApiResponse::success(status))),
        Err(e) => {
            error!("Failed to read run leases: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Force-release a workflow's lease (for runs stuck after a crash)
pub async fn release_operation(
    Path(workflow_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Value> {
    info!("Lease release requested for: {}", workflow_id);

    match state.leases.force_release(&workflow_id).await {
        Ok(holder) => Ok(Json(ApiResponse::success(json!({
            "message": format!("Lease released for {}", workflow_id),
            "run_id": holder.run_id,
            "acquired_at": holder.acquired_at,
        })))),
        Err(e) => {
            error!("Failed to release lease for {}: {}", workflow_id, e);
            Err(api_error(StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}
