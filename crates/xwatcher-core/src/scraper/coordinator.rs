//! Scrape coordination across multiple usernames.
//!
//! Fans out per-user fetches under a semaphore, persists new tweets in one
//! transaction per user, and folds the outcome into fetch statistics. A
//! provider 401 aborts the whole run; any other per-user failure is
//! collected and the run continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::storage::{self, DbPool};

use super::client::{is_valid_username, TweetFetcher};
use super::limits::{next_limit, updated_stats, LimitParams};

/// Aggregate outcome of one coordinated scrape run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScrapeResult {
    /// Usernames attempted.
    pub total_users: usize,
    /// Usernames fetched and persisted without error.
    pub successful_users: usize,
    /// Usernames that failed.
    pub failed_users: usize,
    /// Tweets returned by the provider across all users.
    pub total_tweets: u64,
    /// Tweets written for the first time.
    pub new_tweets: u64,
    /// Tweets skipped as already present.
    pub skipped_tweets: u64,
    /// Per-username error messages.
    pub errors: HashMap<String, String>,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    /// True when the overall deadline expired and in-flight fetches were
    /// cancelled; counts above cover only the users that finished.
    pub timed_out: bool,
    /// Ids of the newly written tweets, for post-processing.
    #[serde(skip_serializing)]
    pub new_tweet_ids: Vec<String>,
}

/// Outcome of one user's fetch inside the fan-out.
enum UserOutcome {
    Success {
        username: String,
        fetched: u64,
        new: u64,
        skipped: u64,
        new_ids: Vec<String>,
    },
    Failure {
        username: String,
        message: String,
    },
    FatalAuth,
    Cancelled,
}

/// Coordinates multi-user scrapes against the Store.
pub struct ScrapeCoordinator {
    pool: DbPool,
    fetcher: Arc<dyn TweetFetcher>,
    limit_params: LimitParams,
    max_concurrent: usize,
    overall_timeout: Option<std::time::Duration>,
}

impl ScrapeCoordinator {
    /// Create a coordinator.
    pub fn new(
        pool: DbPool,
        fetcher: Arc<dyn TweetFetcher>,
        limit_params: LimitParams,
        max_concurrent: usize,
    ) -> Self {
        Self {
            pool,
            fetcher,
            limit_params,
            max_concurrent: max_concurrent.max(1),
            overall_timeout: None,
        }
    }

    /// Bound the whole run; on expiry, in-flight fetches are cancelled and
    /// the partial result carries `timed_out = true`.
    pub fn with_overall_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Scrape the given usernames concurrently.
    ///
    /// `limit_override` bypasses the adaptive limit for every user. The
    /// username list is deduplicated and validated up front; an invalid
    /// handle fails the whole request. A provider 401 aborts the run.
    pub async fn scrape_users(
        &self,
        usernames: &[String],
        limit_override: Option<u32>,
    ) -> Result<ScrapeResult, ScraperError> {
        let started = Instant::now();

        let mut seen = std::collections::HashSet::new();
        let unique: Vec<String> = usernames
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect();

        if unique.is_empty() {
            return Err(ScraperError::InvalidRequest(
                "no usernames to scrape".to_string(),
            ));
        }
        for username in &unique {
            if !is_valid_username(username) {
                return Err(ScraperError::InvalidRequest(format!(
                    "invalid username: {username}"
                )));
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let cancel = CancellationToken::new();
        let mut join_set = JoinSet::new();

        for username in unique.clone() {
            let pool = self.pool.clone();
            let fetcher = self.fetcher.clone();
            let limit_params = self.limit_params;
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return UserOutcome::Cancelled,
                };
                if cancel.is_cancelled() {
                    return UserOutcome::Cancelled;
                }

                let outcome = scrape_one_user(
                    &pool,
                    fetcher.as_ref(),
                    &username,
                    limit_override,
                    &limit_params,
                )
                .await;
                if matches!(outcome, UserOutcome::FatalAuth) {
                    cancel.cancel();
                }
                outcome
            });
        }

        let mut result = ScrapeResult {
            total_users: unique.len(),
            ..ScrapeResult::default()
        };
        let mut fatal_auth = false;
        let deadline = self.overall_timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let joined = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            tracing::warn!("scrape run deadline expired, cancelling remaining fetches");
                            cancel.cancel();
                            join_set.shutdown().await;
                            result.timed_out = true;
                            break;
                        }
                    }
                }
                None => join_set.join_next().await,
            };
            let Some(joined) = joined else { break };

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "scrape task panicked");
                    continue;
                }
            };
            match outcome {
                UserOutcome::Success {
                    username,
                    fetched,
                    new,
                    skipped,
                    new_ids,
                } => {
                    tracing::info!(username = %username, fetched, new, skipped, "user scraped");
                    result.successful_users += 1;
                    result.total_tweets += fetched;
                    result.new_tweets += new;
                    result.skipped_tweets += skipped;
                    result.new_tweet_ids.extend(new_ids);
                }
                UserOutcome::Failure { username, message } => {
                    tracing::warn!(username = %username, error = %message, "user scrape failed");
                    result.failed_users += 1;
                    result.errors.insert(username, message);
                }
                UserOutcome::FatalAuth => fatal_auth = true,
                UserOutcome::Cancelled => {}
            }
        }

        if fatal_auth {
            return Err(ScraperError::AuthFailed);
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}

/// Fetch, persist, and account one user.
async fn scrape_one_user(
    pool: &DbPool,
    fetcher: &dyn TweetFetcher,
    username: &str,
    limit_override: Option<u32>,
    limit_params: &LimitParams,
) -> UserOutcome {
    let stats = match storage::fetch_stats::get_fetch_stats(pool, username).await {
        Ok(stats) => stats,
        Err(e) => {
            return UserOutcome::Failure {
                username: username.to_string(),
                message: e.to_string(),
            }
        }
    };

    let limit = limit_override.unwrap_or_else(|| next_limit(stats.as_ref(), limit_params));

    let tweets = match fetcher.fetch_user_tweets(username, limit).await {
        Ok(tweets) => tweets,
        Err(ScraperError::AuthFailed) => return UserOutcome::FatalAuth,
        Err(e) => {
            return UserOutcome::Failure {
                username: username.to_string(),
                message: e.to_string(),
            }
        }
    };
    let fetched = tweets.len() as u64;

    let insert = match storage::tweets::insert_tweets(pool, &tweets).await {
        Ok(insert) => insert,
        Err(e) => {
            return UserOutcome::Failure {
                username: username.to_string(),
                message: e.to_string(),
            }
        }
    };

    let updated = updated_stats(
        stats.as_ref(),
        username,
        fetched as i64,
        insert.new as i64,
        limit_params,
    );
    if let Err(e) = storage::fetch_stats::upsert_fetch_stats(pool, &updated).await {
        return UserOutcome::Failure {
            username: username.to_string(),
            message: e.to_string(),
        };
    }

    UserOutcome::Success {
        username: username.to_string(),
        fetched,
        new: insert.new,
        skipped: insert.skipped,
        new_ids: insert.new_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use crate::storage::tweets::{sample_tweet, Tweet};
    use std::sync::Mutex;

    /// Fetcher returning canned per-user results.
    struct MockFetcher {
        responses: Mutex<HashMap<String, Result<Vec<Tweet>, ScraperError>>>,
        requested_limits: Mutex<HashMap<String, u32>>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                requested_limits: Mutex::new(HashMap::new()),
            }
        }

        fn respond(&self, username: &str, tweets: Vec<Tweet>) {
            self.responses
                .lock()
                .unwrap()
                .insert(username.to_string(), Ok(tweets));
        }

        fn fail(&self, username: &str, err: ScraperError) {
            self.responses
                .lock()
                .unwrap()
                .insert(username.to_string(), Err(err));
        }

        fn limit_for(&self, username: &str) -> Option<u32> {
            self.requested_limits.lock().unwrap().get(username).copied()
        }
    }

    #[async_trait::async_trait]
    impl TweetFetcher for MockFetcher {
        async fn fetch_user_tweets(
            &self,
            username: &str,
            limit: u32,
        ) -> Result<Vec<Tweet>, ScraperError> {
            self.requested_limits
                .lock()
                .unwrap()
                .insert(username.to_string(), limit);
            match self.responses.lock().unwrap().remove(username) {
                Some(result) => result,
                None => Ok(Vec::new()),
            }
        }
    }

    fn coordinator(pool: DbPool, fetcher: Arc<MockFetcher>) -> ScrapeCoordinator {
        ScrapeCoordinator::new(pool, fetcher, LimitParams::default(), 3)
    }

    #[tokio::test]
    async fn happy_path_single_user() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(
            "alice",
            vec![
                sample_tweet("t1", "alice", "one"),
                sample_tweet("t2", "alice", "two"),
                sample_tweet("t3", "alice", "three"),
            ],
        );

        let result = coordinator(pool.clone(), fetcher.clone())
            .scrape_users(&["alice".to_string()], Some(10))
            .await
            .expect("scrape");

        assert_eq!(result.total_users, 1);
        assert_eq!(result.successful_users, 1);
        assert_eq!(result.failed_users, 0);
        assert_eq!(result.total_tweets, 3);
        assert_eq!(result.new_tweets, 3);
        assert_eq!(result.skipped_tweets, 0);
        assert_eq!(result.new_tweet_ids.len(), 3);
        assert_eq!(fetcher.limit_for("alice"), Some(10));

        // Fetch stats recorded: first fetch, everything new.
        let stats = storage::fetch_stats::get_fetch_stats(&pool, "alice")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stats.last_fetched_count, 3);
        assert_eq!(stats.last_new_count, 3);
        assert_eq!(stats.total_fetches, 1);
        assert_eq!(stats.consecutive_empty_fetches, 0);
        assert!((stats.avg_new_rate - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rescrape_skips_existing() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("alice", vec![sample_tweet("t1", "alice", "one")]);

        let coord = coordinator(pool.clone(), fetcher.clone());
        coord
            .scrape_users(&["alice".to_string()], Some(10))
            .await
            .expect("first");

        fetcher.respond("alice", vec![sample_tweet("t1", "alice", "one")]);
        let second = coord
            .scrape_users(&["alice".to_string()], Some(10))
            .await
            .expect("second");

        assert_eq!(second.new_tweets, 0);
        assert_eq!(second.skipped_tweets, 1);
        assert!(second.new_tweet_ids.is_empty());
    }

    #[tokio::test]
    async fn adaptive_limit_used_without_override() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("bob", Vec::new());

        // Saturated prior stats: next limit should double to 100.
        storage::fetch_stats::upsert_fetch_stats(
            &pool,
            &crate::storage::fetch_stats::FetchStats {
                username: "bob".to_string(),
                last_fetch_at: None,
                last_fetched_count: 50,
                last_new_count: 50,
                total_fetches: 1,
                avg_new_rate: 1.0,
                consecutive_empty_fetches: 0,
            },
        )
        .await
        .expect("seed stats");

        coordinator(pool, fetcher.clone())
            .scrape_users(&["bob".to_string()], None)
            .await
            .expect("scrape");

        assert_eq!(fetcher.limit_for("bob"), Some(100));
    }

    #[tokio::test]
    async fn per_user_failure_does_not_abort_run() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("alice", vec![sample_tweet("t1", "alice", "one")]);
        fetcher.fail(
            "broken",
            ScraperError::ApiError {
                status: 404,
                message: "no such user".to_string(),
            },
        );

        let result = coordinator(pool, fetcher)
            .scrape_users(&["alice".to_string(), "broken".to_string()], Some(10))
            .await
            .expect("scrape");

        assert_eq!(result.successful_users, 1);
        assert_eq!(result.failed_users, 1);
        assert!(result.errors.contains_key("broken"));
        assert_eq!(result.new_tweets, 1);
    }

    #[tokio::test]
    async fn auth_failure_aborts_run() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("alice", ScraperError::AuthFailed);

        let err = coordinator(pool, fetcher)
            .scrape_users(&["alice".to_string()], Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::AuthFailed));
    }

    #[tokio::test]
    async fn empty_username_list_rejected() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        let err = coordinator(pool, fetcher)
            .scrape_users(&[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn invalid_username_rejected() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        let err = coordinator(pool, fetcher)
            .scrape_users(&["not a handle".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn duplicate_usernames_collapsed() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("alice", vec![sample_tweet("t1", "alice", "one")]);

        let result = coordinator(pool, fetcher)
            .scrape_users(&["alice".to_string(), "alice".to_string()], Some(10))
            .await
            .expect("scrape");
        assert_eq!(result.total_users, 1);
    }

    #[tokio::test]
    async fn overall_deadline_yields_partial_result() {
        /// Fetcher that never completes.
        struct StuckFetcher;

        #[async_trait::async_trait]
        impl TweetFetcher for StuckFetcher {
            async fn fetch_user_tweets(
                &self,
                _username: &str,
                _limit: u32,
            ) -> Result<Vec<Tweet>, ScraperError> {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }

        let pool = init_test_db().await.expect("init db");
        let coordinator = ScrapeCoordinator::new(
            pool,
            Arc::new(StuckFetcher),
            LimitParams::default(),
            3,
        )
        .with_overall_timeout(std::time::Duration::from_millis(50));

        let result = coordinator
            .scrape_users(&["alice".to_string()], Some(10))
            .await
            .expect("partial result");
        assert!(result.timed_out);
        assert_eq!(result.successful_users, 0);
    }

    #[tokio::test]
    async fn empty_fetch_increments_streak() {
        let pool = init_test_db().await.expect("init db");
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("alice", Vec::new());

        coordinator(pool.clone(), fetcher)
            .scrape_users(&["alice".to_string()], Some(10))
            .await
            .expect("scrape");

        let stats = storage::fetch_stats::get_fetch_stats(&pool, "alice")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stats.consecutive_empty_fetches, 1);
    }
}
