// Run history and manual trigger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

use super::common::{api_error, ApiResponse, ApiResult, RunHistoryQuery};
use crate::database::RunRecord;
use crate::operation_tracker::LeaseError;
use crate::web::{AppState, RunDetail, TriggeredRun};

pub async fn list_runs(
    Query(query): Query<RunHistoryQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<RunRecord>> {
    match state
        .database
        .recent_runs(&state.config.workflow.id, query.effective_limit())
        .await
    {
        Ok(runs) => Ok(Json(ApiResponse::success(runs))),
        Err(e) => {
            error!("Failed to load run history: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn get_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<RunDetail> {
    let run = match state.database.get_run(&run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("Run {} not found", run_id),
            ))
        }
        Err(e) => {
            error!("Failed to load run {}: {}", run_id, e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let stages = state.database.stage_runs(&run_id).await.map_err(|e| {
        error!("Failed to load stages for run {}: {}", run_id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(ApiResponse::success(RunDetail { run, stages })))
}

/// Start a manual run at the current minute; returns as soon as it is running
pub async fn trigger_run(State(state): State<AppState>) -> ApiResult<TriggeredRun> {
    info!("Manual run requested for {}", state.config.workflow.id);

    match state.runner.trigger_manual().await {
        Ok(ctx) => {
            info!("Manual run {} started", ctx.run_id);
            Ok(Json(ApiResponse::success(TriggeredRun {
                source_key: ctx.source_key(),
                run_id: ctx.run_id,
                workflow_id: ctx.workflow_id,
                logical_date: ctx.logical_date,
            })))
        }
        Err(LeaseError::Held(held)) => {
            warn!("Manual run rejected: {}", held);
            Err(api_error(StatusCode::CONFLICT, held.to_string()))
        }
        Err(e) => {
            error!("Manual run could not start: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
