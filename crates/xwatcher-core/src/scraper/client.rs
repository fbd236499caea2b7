//! HTTP client for the upstream tweet provider.
//!
//! Stateless adapter: one call fetches a user's recent tweets, normalises
//! them, and classifies transport errors. Retriable failures (429, 503,
//! 504, network) back off exponentially from 1s to 60s for at most five
//! attempts; a 401 is fatal and never retried.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ScraperError;
use crate::storage::tweets::Tweet;

use super::types::LastTweetsResponse;

/// Maximum fetch attempts per request.
const MAX_ATTEMPTS: u32 = 5;

/// Initial backoff delay.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Backoff ceiling.
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Largest accepted `limit` parameter.
const MAX_LIMIT: u32 = 1000;

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9_]{1,15}$").expect("valid username regex"))
}

/// Validate a platform handle.
pub fn is_valid_username(username: &str) -> bool {
    username_pattern().is_match(username)
}

/// Abstraction over the tweet source, so the coordinator can be tested
/// without a live provider.
#[async_trait::async_trait]
pub trait TweetFetcher: Send + Sync {
    /// Fetch up to `limit` recent tweets for `username`, normalised.
    async fn fetch_user_tweets(
        &self,
        username: &str,
        limit: u32,
    ) -> Result<Vec<Tweet>, ScraperError>;
}

/// Reqwest-based provider client.
pub struct ScraperClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    backoff_base: Duration,
}

impl ScraperClient {
    /// Create a client for the given provider endpoint.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            api_key,
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Override the backoff base delay (used by tests to avoid real sleeps).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        // 1s, 2s, 4s, 8s, ... capped at 60s.
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        (self.backoff_base * factor).min(BACKOFF_MAX)
    }

    async fn fetch_once(&self, username: &str, limit: u32) -> Result<Vec<Tweet>, ScraperError> {
        let url = format!("{}/user/last_tweets", self.base_url);
        let limit_param = limit.to_string();

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&[("userName", username), ("limit", limit_param.as_str())])
            .send()
            .await
            .map_err(|e| ScraperError::Network { source: e })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let message = response.text().await.unwrap_or_default();

            return Err(match status {
                401 => ScraperError::AuthFailed,
                429 => ScraperError::RateLimited { retry_after },
                _ => ScraperError::ApiError { status, message },
            });
        }

        let body: LastTweetsResponse = response
            .json()
            .await
            .map_err(|e| ScraperError::Parse(format!("invalid response JSON: {e}")))?;

        let upstream = body.data.map(|d| d.tweets).unwrap_or_default();
        let total = upstream.len();
        let tweets: Vec<Tweet> = upstream
            .into_iter()
            .filter_map(super::types::UpstreamTweet::into_canonical)
            .collect();

        if tweets.len() < total {
            tracing::warn!(
                username,
                dropped = total - tweets.len(),
                "dropped tweets failing validation"
            );
        }

        Ok(tweets)
    }
}

fn is_retriable(err: &ScraperError) -> bool {
    match err {
        ScraperError::RateLimited { .. } => true,
        ScraperError::Network { .. } => true,
        ScraperError::ApiError { status, .. } => matches!(status, 503 | 504),
        _ => false,
    }
}

#[async_trait::async_trait]
impl TweetFetcher for ScraperClient {
    async fn fetch_user_tweets(
        &self,
        username: &str,
        limit: u32,
    ) -> Result<Vec<Tweet>, ScraperError> {
        if !is_valid_username(username) {
            return Err(ScraperError::InvalidRequest(format!(
                "invalid username: {username}"
            )));
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(ScraperError::InvalidRequest(format!(
                "limit must be in 1..={MAX_LIMIT}, got {limit}"
            )));
        }

        let mut last_error: Option<ScraperError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.fetch_once(username, limit).await {
                Ok(tweets) => {
                    tracing::debug!(username, limit, count = tweets.len(), attempt, "fetch ok");
                    return Ok(tweets);
                }
                Err(err) if is_retriable(&err) => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        username,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retriable fetch error"
                    );
                    last_error = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(ScraperError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
