//! Runtime schedule administration.

use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{require_admin, AuthContext};
use crate::error::ApiError;
use crate::state::AppState;

fn updated_by(ctx: &AuthContext) -> String {
    if ctx.email.is_empty() {
        "admin".to_string()
    } else {
        ctx.email.clone()
    }
}

/// `GET /api/admin/scraping/schedule` — current schedule status.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    let status = state.scheduler.status().await?;
    Ok(Json(json!(status)))
}

/// Request body for interval updates.
#[derive(Deserialize)]
pub struct IntervalRequest {
    /// New interval in seconds, within `[300, 604800]`.
    pub interval_seconds: i64,
}

/// `PUT /api/admin/scraping/schedule/interval` — change the interval.
pub async fn update_interval(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<IntervalRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    state
        .scheduler
        .update_interval(body.interval_seconds, &updated_by(&ctx))
        .await?;
    let status = state.scheduler.status().await?;
    Ok(Json(json!(status)))
}

/// Request body for a one-shot run.
#[derive(Deserialize)]
pub struct NextRunRequest {
    /// RFC 3339 timestamp in the future (30 s tolerance), within 30 days.
    pub next_run_time: String,
}

/// `PUT /api/admin/scraping/schedule/next-run` — schedule a one-shot run.
pub async fn set_next_run(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<NextRunRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    state
        .scheduler
        .set_next_run(&body.next_run_time, &updated_by(&ctx))
        .await?;
    let status = state.scheduler.status().await?;
    Ok(Json(json!(status)))
}

/// `POST /api/admin/scraping/schedule/enable` — enable the schedule.
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    state.scheduler.enable(&updated_by(&ctx)).await?;
    let status = state.scheduler.status().await?;
    Ok(Json(json!(status)))
}

/// `POST /api/admin/scraping/schedule/disable` — disable the schedule.
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    state.scheduler.disable(&updated_by(&ctx)).await?;
    let status = state.scheduler.status().await?;
    Ok(Json(json!(status)))
}
