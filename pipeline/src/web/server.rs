use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::web::{handlers, AppState};

pub async fn start_web_server(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_service_health))
        // === RUN HISTORY & MANUAL TRIGGER ===
        .route("/api/runs", get(handlers::list_runs))
        .route("/api/runs/trigger", post(handlers::trigger_run))
        .route("/api/runs/{run_id}", get(handlers::get_run))
        // === LEASE MANAGEMENT ===
        .route("/api/operations/active", get(handlers::get_active_operations))
        .route(
            "/api/operations/{workflow_id}/release",
            post(handlers::release_operation),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
