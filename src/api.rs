// Operational endpoints: liveness and per-source indexing progress

use crate::database::{Database, DbPool};
use crate::orchestrator::{SourceStatus, StatusRegistry};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub status: StatusRegistry,
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(indexer_status))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_health = Database::ping(&state.db).await.is_ok();
    let indexer_running = !state.shutdown.is_cancelled();

    let status = if db_health && indexer_running {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(serde_json::json!({
        "status": status,
        "database": if db_health { "up" } else { "down" },
        "indexer": if indexer_running { "running" } else { "stopped" },
    }))
}

pub async fn indexer_status(State(state): State<Arc<AppState>>) -> Json<Vec<SourceStatus>> {
    let sources = state.status.read().await.values().cloned().collect();
    Json(sources)
}
