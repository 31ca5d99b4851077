use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use tracing::error;

use super::common::{api_error, ApiResponse, ApiResult};
use crate::web::{AppState, ServiceHealth};

pub async fn get_service_health(State(state): State<AppState>) -> ApiResult<ServiceHealth> {
    let workflow_id = state.config.workflow.id.clone();
    let run_in_progress = state.leases.is_busy(&workflow_id).await.map_err(|e| {
        error!("Failed to read run lease: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(ApiResponse::success(ServiceHealth {
        status: "ok".to_string(),
        schedule: state.config.workflow.schedule.clone(),
        storage_backend: format!("{:?}", state.config.storage.backend).to_lowercase(),
        bucket: state.config.storage.bucket.clone(),
        run_in_progress,
        uptime_seconds: Utc::now()
            .signed_duration_since(state.started_at)
            .num_seconds(),
        workflow_id,
    })))
}
