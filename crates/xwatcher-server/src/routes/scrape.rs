//! Scrape job endpoints: enqueue, poll, list, delete.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::pipeline::task_types;
use xwatcher_core::scraper::is_valid_username;
use xwatcher_core::tasks::TaskStatus;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for enqueueing a scrape.
#[derive(Deserialize)]
pub struct ScrapeRequest {
    /// Comma-separated usernames.
    pub usernames: String,
    /// Optional fixed fetch limit overriding the adaptive calculation.
    pub limit: Option<u32>,
}

/// `POST /api/admin/scrape` — enqueue a scrape job (202).
pub async fn enqueue_scrape(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScrapeRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let usernames: Vec<String> = body
        .usernames
        .split(',')
        .map(|u| u.trim().trim_start_matches('@').to_string())
        .filter(|u| !u.is_empty())
        .collect();

    if usernames.is_empty() {
        return Err(ApiError::BadRequest("usernames is required".to_string()));
    }
    for username in &usernames {
        if !is_valid_username(username) {
            return Err(ApiError::Unprocessable(format!(
                "invalid username: {username}"
            )));
        }
    }
    if let Some(limit) = body.limit {
        if limit == 0 || limit > 1000 {
            return Err(ApiError::Unprocessable(format!(
                "limit must be in 1..=1000, got {limit}"
            )));
        }
    }

    // One scrape job class at a time; concurrent requests conflict.
    if state.registry().is_running(task_types::SCRAPE) {
        return Err(ApiError::Conflict(
            "a scrape task is already running".to_string(),
        ));
    }

    let task_id = state.pipeline.spawn_scrape_task(usernames, body.limit);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task_id, "status": "pending"})),
    ))
}

/// `GET /api/admin/scrape/{task_id}` — fetch one task.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.registry().get(&task_id)?;
    Ok(Json(json!(record)))
}

/// Query parameters for the task list.
#[derive(Deserialize)]
pub struct ListTasksQuery {
    /// Optional status filter ("pending", "running", "completed", "failed").
    pub status: Option<String>,
}

/// `GET /api/admin/scrape` — list tasks, optionally filtered by status.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTasksQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown status filter: {raw}"))
        })?),
    };

    let tasks = state.registry().list(status);
    let total = tasks.len();
    Ok(Json(json!({"tasks": tasks, "total": total})))
}

/// `DELETE /api/admin/scrape/{task_id}` — remove a terminal task (204).
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry().delete(&task_id)?;
    Ok(StatusCode::NO_CONTENT)
}
