//! Incremental feed endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::storage::{summaries, tweets};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the feed.
#[derive(Deserialize)]
pub struct FeedQuery {
    /// Exclusive lower bound on `db_created_at` (last timestamp the caller saw).
    pub since: Option<String>,
    /// Inclusive upper bound on `db_created_at`.
    pub until: Option<String>,
    /// Maximum items (max 500).
    pub limit: Option<u32>,
    /// Embed summary records in the items.
    pub include_summary: Option<bool>,
}

/// `GET /api/feed` — incremental feed ordered by insertion time ascending.
///
/// Agents poll with `since` set to the `db_created_at` of the last item
/// they processed.
pub async fn feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    let include_summary = params.include_summary.unwrap_or(false);

    let items = tweets::feed(
        &state.db,
        params.since.as_deref(),
        params.until.as_deref(),
        limit,
    )
    .await?;

    let next_cursor = items.last().map(|t| t.db_created_at.clone());

    let payload: Vec<Value> = if include_summary {
        let mut out = Vec::with_capacity(items.len());
        for tweet in items {
            let summary = summaries::get_summary_by_tweet_id(&state.db, &tweet.tweet_id).await?;
            out.push(json!({"tweet": tweet, "summary": summary}));
        }
        out
    } else {
        items.into_iter().map(|t| json!({"tweet": t})).collect()
    };

    let count = payload.len();
    Ok(Json(json!({
        "items": payload,
        "count": count,
        "next_since": next_cursor,
    })))
}
