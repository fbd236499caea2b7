//! Summarisation endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::storage::{summaries, tweets};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for a summary batch.
#[derive(Deserialize)]
pub struct SummaryBatchRequest {
    /// Tweets to summarise.
    pub tweet_ids: Vec<String>,
    /// Regenerate even when cached.
    #[serde(default)]
    pub force_refresh: bool,
}

/// `POST /api/summaries/batch` — enqueue a summary job (202).
pub async fn enqueue_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SummaryBatchRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.tweet_ids.is_empty() {
        return Err(ApiError::BadRequest("tweet_ids is required".to_string()));
    }

    let task_id = state
        .pipeline
        .spawn_summary_task(body.tweet_ids, body.force_refresh);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task_id, "status": "pending"})),
    ))
}

/// `GET /api/summaries/tweets/{tweet_id}` — fetch a tweet's summary.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(tweet_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let summary = summaries::get_summary_by_tweet_id(&state.db, &tweet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no summary for tweet: {tweet_id}")))?;
    Ok(Json(json!(summary)))
}

/// `POST /api/summaries/tweets/{tweet_id}/regenerate` — force refresh one
/// tweet's summary (202).
pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    Path(tweet_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !tweets::tweet_exists(&state.db, &tweet_id).await? {
        return Err(ApiError::NotFound(format!("tweet not found: {tweet_id}")));
    }

    let task_id = state.pipeline.spawn_summary_task(vec![tweet_id], true);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task_id, "status": "pending"})),
    ))
}

/// Query parameters for aggregate stats.
#[derive(Deserialize)]
pub struct StatsQuery {
    /// Inclusive start of the range (RFC 3339 or date prefix).
    pub start_date: Option<String>,
    /// Inclusive end of the range.
    pub end_date: Option<String>,
}

/// `GET /api/summaries/stats` — aggregate cost/tokens by provider.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let rows = summaries::stats_by_provider(
        &state.db,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )
    .await?;

    let total_cost: f64 = rows.iter().map(|r| r.total_cost_usd).sum();
    let total_tokens: i64 = rows.iter().map(|r| r.total_tokens).sum();

    Ok(Json(json!({
        "providers": rows,
        "total_cost_usd": total_cost,
        "total_tokens": total_tokens,
    })))
}
