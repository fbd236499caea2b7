//! Tweet read endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::storage::{dedup_groups, summaries, tweets};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the paginated tweet list.
#[derive(Deserialize)]
pub struct ListTweetsQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size (max 100).
    pub page_size: Option<u32>,
    /// Restrict to one author handle.
    pub author: Option<String>,
}

/// `GET /api/tweets` — paginated list with summary/dedup flags.
pub async fn list_tweets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTweetsQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);

    let (items, total) =
        tweets::list_tweets(&state.db, page, page_size, params.author.as_deref()).await?;

    Ok(Json(json!({
        "tweets": items,
        "total": total,
        "page": page,
        "page_size": page_size,
    })))
}

/// `GET /api/tweets/{tweet_id}` — full tweet with embedded summary and
/// dedup group.
pub async fn get_tweet(
    State(state): State<Arc<AppState>>,
    Path(tweet_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tweet = tweets::get_tweet_by_id(&state.db, &tweet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tweet not found: {tweet_id}")))?;

    let summary = summaries::get_summary_by_tweet_id(&state.db, &tweet_id).await?;
    let group = match &tweet.dedup_group_id {
        Some(group_id) => dedup_groups::get_group(&state.db, group_id).await?,
        None => None,
    };

    Ok(Json(json!({
        "tweet": tweet,
        "summary": summary,
        "dedup_group": group,
    })))
}
