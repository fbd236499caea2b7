//! Composite health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /health` — component health, always HTTP 200.
///
/// The overall `status` degrades to "degraded" when any component is
/// unhealthy, but the HTTP status stays 200 so load balancers can read
/// the body instead of retrying.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = match xwatcher_core::storage::ping(&state.db).await {
        Ok(()) => json!({"status": "healthy"}),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            json!({"status": "unhealthy", "detail": "query failed"})
        }
    };
    let db_healthy = database["status"] == "healthy";

    let scheduler = match state.scheduler.status().await {
        Ok(status) => json!({
            "status": "healthy",
            "is_enabled": status.is_enabled,
            "is_running": status.is_running,
            "skipped_ticks": status.skipped_ticks,
        }),
        Err(e) => {
            tracing::error!(error = %e, "scheduler health check failed");
            json!({"status": "unhealthy", "detail": "status unavailable"})
        }
    };
    let scheduler_healthy = scheduler["status"] == "healthy";

    Json(json!({
        "status": if db_healthy && scheduler_healthy { "healthy" } else { "degraded" },
        "components": {
            "database": database,
            "scheduler": scheduler,
        },
    }))
}
