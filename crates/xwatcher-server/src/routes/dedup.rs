//! Deduplication endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::storage::dedup_groups;

use crate::error::ApiError;
use crate::state::AppState;

/// Optional per-request dedup configuration.
#[derive(Deserialize, Default)]
pub struct DedupRequestConfig {
    /// Rebuild groups covering the batch before running.
    #[serde(default)]
    pub force_refresh: bool,
    /// Override the cosine threshold for this run.
    pub similarity_threshold: Option<f64>,
}

/// Request body for a dedup batch.
#[derive(Deserialize)]
pub struct DedupBatchRequest {
    /// Tweets to deduplicate.
    pub tweet_ids: Vec<String>,
    /// Optional configuration.
    #[serde(default)]
    pub config: Option<DedupRequestConfig>,
}

/// `POST /api/deduplicate/batch` — enqueue a dedup job (202).
pub async fn enqueue_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DedupBatchRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.tweet_ids.is_empty() {
        return Err(ApiError::BadRequest("tweet_ids is required".to_string()));
    }

    let config = body.config.unwrap_or_default();
    if let Some(threshold) = config.similarity_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ApiError::Unprocessable(format!(
                "similarity_threshold must be in 0..=1, got {threshold}"
            )));
        }
    }

    let task_id = state.pipeline.spawn_dedup_task(
        body.tweet_ids,
        config.force_refresh,
        config.similarity_threshold,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task_id, "status": "pending"})),
    ))
}

/// `GET /api/deduplicate/groups/{group_id}` — inspect a group.
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let group = dedup_groups::get_group(&state.db, &group_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dedup group not found: {group_id}")))?;
    Ok(Json(json!(group)))
}

/// `DELETE /api/deduplicate/groups/{group_id}` — undo a grouping (204).
///
/// Members' back-references are cleared in the same transaction.
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = dedup_groups::delete_group(&state.db, &group_id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!(
            "dedup group not found: {group_id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
