//! Integration tests for the xwatcher-server API routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use xwatcher_core::config::Config;
use xwatcher_core::dedup::DedupEngine;
use xwatcher_core::llm::router::LlmRouter;
use xwatcher_core::metrics::Metrics;
use xwatcher_core::pipeline::Pipeline;
use xwatcher_core::scheduler::ScraperScheduler;
use xwatcher_core::scraper::{LimitParams, ScrapeCoordinator, ScraperClient, TweetFetcher};
use xwatcher_core::storage::{self, DbPool};
use xwatcher_core::summarizer::Summarizer;
use xwatcher_core::tasks::TaskRegistry;
use xwatcher_server::state::AppState;

/// The bootstrap admin key used across all tests.
const ADMIN_KEY: &str = "test-admin-key";

fn test_config() -> Config {
    let mut env = HashMap::new();
    env.insert("TWITTER_API_KEY", "scraper-key");
    env.insert("JWT_SECRET_KEY", "jwt-secret");
    env.insert("ADMIN_API_KEY", ADMIN_KEY);
    env.insert("SCRAPER_ENABLED", "false");
    env.insert("AUTO_SUMMARIZATION_ENABLED", "false");
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).expect("config")
}

/// Build a router backed by an in-memory database.
///
/// `scraper_base_url` points the provider client at a wiremock server for
/// tests that exercise the scrape path.
async fn test_state(scraper_base_url: Option<String>) -> (axum::Router, DbPool) {
    let config = test_config();
    let pool = storage::init_test_db().await.expect("init test db");

    storage::schedule::ensure_schedule_config(
        &pool,
        config.scraper.interval_seconds,
        config.scraper.enabled,
    )
    .await
    .expect("schedule config");

    let fetcher: Arc<dyn TweetFetcher> = Arc::new(
        ScraperClient::new(
            scraper_base_url.unwrap_or_else(|| "http://127.0.0.1:1".to_string()),
            config.scraper.api_key.clone(),
        )
        .with_backoff_base(Duration::from_millis(1)),
    );
    let coordinator = Arc::new(ScrapeCoordinator::new(
        pool.clone(),
        fetcher,
        LimitParams::default(),
        config.scraper.max_concurrent_scrapes,
    ));

    let summarizer = Arc::new(Summarizer::new(
        pool.clone(),
        Arc::new(LlmRouter::new(Vec::new())),
        config.summarizer.clone(),
    ));

    let metrics = Arc::new(Metrics::new());
    let pipeline = Arc::new(Pipeline {
        pool: pool.clone(),
        coordinator,
        dedup: Arc::new(DedupEngine::new(pool.clone())),
        summarizer,
        registry: TaskRegistry::new(),
        metrics: metrics.clone(),
        auto_summarization: config.summarizer.auto_enabled,
        auto_batch_size: config.summarizer.auto_batch_size,
        similarity_threshold: config.dedup.similarity_threshold,
    });

    let scheduler = Arc::new(ScraperScheduler::new(pool.clone(), pipeline.clone()));

    let state = Arc::new(AppState {
        db: pool.clone(),
        config,
        pipeline,
        scheduler,
        metrics,
    });

    (xwatcher_server::build_router(state), pool)
}

async fn send(
    router: &axum::Router,
    method: &str,
    path: &str,
    auth: Option<(&str, &str)>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some((header, value)) = auth {
        builder = builder.header(header, value);
    }

    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };

    let response = router.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn admin_auth() -> Option<(&'static str, &'static str)> {
    Some(("X-API-Key", ADMIN_KEY))
}

/// Create a user via the bootstrap admin and log in, returning a bearer token.
async fn login_user(router: &axum::Router, email: &str, is_admin: bool) -> String {
    let (status, _) = send(
        router,
        "POST",
        "/api/admin/users",
        admin_auth(),
        Some(serde_json::json!({
            "email": email,
            "password": "password123",
            "is_admin": is_admin,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        router,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": email, "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().expect("token").to_string()
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Poll a task until it reaches a terminal state.
async fn wait_for_task(
    router: &axum::Router,
    token_header: (&str, &str),
    task_id: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        let (status, body) = send(
            router,
            "GET",
            &format!("/api/admin/scrape/{task_id}"),
            Some(token_header),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let task_status = body["status"].as_str().unwrap_or_default().to_string();
        if task_status == "completed" || task_status == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} did not finish");
}

// ============================================================
// Unauthenticated endpoints
// ============================================================

#[tokio::test]
async fn health_works_without_auth() {
    let (router, _pool) = test_state(None).await;
    let (status, body) = send(&router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["database"]["status"], "healthy");
    assert!(body["components"]["scheduler"].is_object());
}

#[tokio::test]
async fn metrics_works_without_auth() {
    let (router, _pool) = test_state(None).await;
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .expect("build");
    let response = router.oneshot(request).await.expect("send");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(text.contains("xwatcher_scrape_runs_total"));
}

#[tokio::test]
async fn protected_endpoint_requires_auth() {
    let (router, _pool) = test_state(None).await;
    let (status, body) = send(&router, "GET", "/api/tweets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn bogus_api_key_rejected() {
    let (router, _pool) = test_state(None).await;
    let (status, _) = send(
        &router,
        "GET",
        "/api/tweets",
        Some(("X-API-Key", "sna_doesnotexist")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================
// Users & auth
// ============================================================

#[tokio::test]
async fn admin_creates_user_and_user_logs_in() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let (status, body) = send(
        &router,
        "GET",
        "/api/users/me",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "user@example.com");
    // The hash never leaves the server.
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let (router, _pool) = test_state(None).await;
    login_user(&router, "dup@example.com", false).await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/admin/users",
        admin_auth(),
        Some(serde_json::json!({"email": "dup@example.com", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().unwrap().contains("dup@example.com"));
}

#[tokio::test]
async fn wrong_password_rejected() {
    let (router, _pool) = test_state(None).await;
    login_user(&router, "user@example.com", false).await;

    let (status, _) = send(
        &router,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "user@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn synthetic_admin_cannot_use_user_endpoints() {
    let (router, _pool) = test_state(None).await;
    let (status, _) = send(&router, "GET", "/api/users/me", admin_auth(), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn non_admin_cannot_manage_follows() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let (status, _) = send(
        &router,
        "GET",
        "/api/admin/scraping/follows",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn api_key_roundtrip() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/users/me/api-keys",
        Some(("Authorization", &bearer(&token))),
        Some(serde_json::json!({"name": "agent"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let plaintext = body["api_key"].as_str().expect("plaintext").to_string();
    assert!(plaintext.starts_with("sna_"));

    // The plaintext authenticates as the user.
    let (status, me) = send(
        &router,
        "GET",
        "/api/users/me",
        Some(("X-API-Key", &plaintext)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "user@example.com");

    // Listing shows the prefix, not the key.
    let (status, listing) = send(
        &router,
        "GET",
        "/api/users/me/api-keys",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 1);
    assert!(listing["api_keys"][0]["last_used_at"].is_string());
    assert!(listing["api_keys"][0].get("key_hash").is_none());

    // Revoke, then the key stops working.
    let key_id = listing["api_keys"][0]["id"].as_i64().expect("id");
    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/api/users/me/api-keys/{key_id}"),
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &router,
        "GET",
        "/api/users/me",
        Some(("X-API-Key", &plaintext)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================
// Follow list administration
// ============================================================

#[tokio::test]
async fn follow_list_crud() {
    let (router, _pool) = test_state(None).await;

    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scraping/follows",
        admin_auth(),
        Some(serde_json::json!({"username": "alice", "reason": "AI news"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Duplicate add conflicts.
    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scraping/follows",
        admin_auth(),
        Some(serde_json::json!({"username": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Invalid handle is a validation error.
    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scraping/follows",
        admin_auth(),
        Some(serde_json::json!({"username": "not a handle"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &router,
        "GET",
        "/api/admin/scraping/follows",
        admin_auth(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = send(
        &router,
        "DELETE",
        "/api/admin/scraping/follows/alice",
        admin_auth(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Soft delete: row survives, inactive.
    let (status, body) = send(
        &router,
        "GET",
        "/api/admin/scraping/follows",
        admin_auth(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["follows"][0]["is_active"], false);
}

// ============================================================
// Schedule administration
// ============================================================

#[tokio::test]
async fn schedule_interval_validation() {
    let (router, _pool) = test_state(None).await;

    let (status, _) = send(
        &router,
        "PUT",
        "/api/admin/scraping/schedule/interval",
        admin_auth(),
        Some(serde_json::json!({"interval_seconds": 60})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &router,
        "PUT",
        "/api/admin/scraping/schedule/interval",
        admin_auth(),
        Some(serde_json::json!({"interval_seconds": 900})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interval_seconds"], 900);
}

#[tokio::test]
async fn schedule_next_run_validation() {
    let (router, _pool) = test_state(None).await;

    let (status, _) = send(
        &router,
        "PUT",
        "/api/admin/scraping/schedule/next-run",
        admin_auth(),
        Some(serde_json::json!({"next_run_time": "2020-01-01T00:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let soon = (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
    let (status, body) = send(
        &router,
        "PUT",
        "/api/admin/scraping/schedule/next-run",
        admin_auth(),
        Some(serde_json::json!({"next_run_time": soon})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["next_run_time"].is_string());
}

#[tokio::test]
async fn schedule_enable_disable() {
    let (router, _pool) = test_state(None).await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/admin/scraping/schedule/enable",
        admin_auth(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_enabled"], true);

    let (status, body) = send(
        &router,
        "POST",
        "/api/admin/scraping/schedule/disable",
        admin_auth(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_enabled"], false);
}

// ============================================================
// Tweets & feed
// ============================================================

#[tokio::test]
async fn empty_tweet_list() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let (status, body) = send(
        &router,
        "GET",
        "/api/tweets",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn missing_tweet_is_404() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let (status, body) = send(
        &router,
        "GET",
        "/api/tweets/nope",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn feed_pagination_with_since() {
    let (router, pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let mut t1 = storage::tweets::sample_tweet("f1", "alice", "first tweet");
    t1.db_created_at = "2026-03-01T10:00:00.000Z".to_string();
    let mut t2 = storage::tweets::sample_tweet("f2", "alice", "second tweet");
    t2.db_created_at = "2026-03-01T11:00:00.000Z".to_string();
    storage::tweets::insert_tweets(&pool, &[t1, t2])
        .await
        .expect("seed");

    let (status, body) = send(
        &router,
        "GET",
        "/api/feed",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["items"][0]["tweet"]["tweet_id"], "f1");
    assert_eq!(body["next_since"], "2026-03-01T11:00:00.000Z");

    let (status, body) = send(
        &router,
        "GET",
        "/api/feed?since=2026-03-01T10:00:00.000Z",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["tweet"]["tweet_id"], "f2");
}

// ============================================================
// Scrape jobs (end to end against a mock provider)
// ============================================================

#[tokio::test]
async fn scrape_job_end_to_end() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    let tweets: Vec<serde_json::Value> = ["t1", "t2", "t3"]
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "text": format!("tweet body for {id}"),
                "createdAt": "Tue Dec 10 07:00:30 +0000 2024",
                "author": {"userName": "alice", "name": "Alice"}
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/user/last_tweets"))
        .and(query_param("userName", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "data": {"tweets": tweets}
        })))
        .mount(&server)
        .await;

    let (router, pool) = test_state(Some(server.uri())).await;
    let token = login_user(&router, "user@example.com", false).await;
    let auth = ("Authorization", bearer(&token));

    let (status, body) = send(
        &router,
        "POST",
        "/api/admin/scrape",
        Some((auth.0, auth.1.as_str())),
        Some(serde_json::json!({"usernames": "alice", "limit": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().expect("task id").to_string();

    let task = wait_for_task(&router, (auth.0, auth.1.as_str()), &task_id).await;
    assert_eq!(task["status"], "completed");
    let result = &task["result"];
    assert_eq!(result["total_users"], 1);
    assert_eq!(result["successful_users"], 1);
    assert_eq!(result["total_tweets"], 3);
    assert_eq!(result["new_tweets"], 3);
    assert_eq!(result["skipped_tweets"], 0);

    // Fetch stats were recorded for the first fetch.
    let stats = storage::fetch_stats::get_fetch_stats(&pool, "alice")
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(stats.last_fetched_count, 3);
    assert_eq!(stats.last_new_count, 3);
    assert_eq!(stats.total_fetches, 1);
    assert_eq!(stats.consecutive_empty_fetches, 0);

    // Terminal task can be deleted.
    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/api/admin/scrape/{task_id}"),
        Some((auth.0, auth.1.as_str())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn scrape_validation_errors() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;
    let auth_value = bearer(&token);
    let auth = Some(("Authorization", auth_value.as_str()));

    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scrape",
        auth,
        Some(serde_json::json!({"usernames": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scrape",
        auth,
        Some(serde_json::json!({"usernames": "not a handle"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scrape",
        auth,
        Some(serde_json::json!({"usernames": "alice", "limit": 5000})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================
// Dedup & summaries
// ============================================================

#[tokio::test]
async fn dedup_batch_end_to_end() {
    let (router, pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;
    let auth_value = bearer(&token);
    let auth = ("Authorization", auth_value.as_str());

    let mut t1 = storage::tweets::sample_tweet("t1", "alice", "Breaking: AI wins");
    t1.created_at = "2026-03-01T10:00:00Z".to_string();
    let mut t2 = storage::tweets::sample_tweet("t2", "alice", "Breaking: AI wins");
    t2.created_at = "2026-03-01T11:00:00Z".to_string();
    let t4 = storage::tweets::sample_tweet("t4", "bob", "Weather is fine");
    storage::tweets::insert_tweets(&pool, &[t1, t2, t4])
        .await
        .expect("seed");

    let (status, body) = send(
        &router,
        "POST",
        "/api/deduplicate/batch",
        Some(auth),
        Some(serde_json::json!({"tweet_ids": ["t1", "t2", "t4"]})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().expect("task id").to_string();

    let task = wait_for_task(&router, auth, &task_id).await;
    assert_eq!(task["status"], "completed");
    let result = &task["result"];
    assert_eq!(result["exact_groups"], 1);
    let group_id = result["groups"][0]["group_id"]
        .as_str()
        .expect("group id")
        .to_string();
    assert_eq!(result["groups"][0]["representative_tweet_id"], "t1");

    // Inspect the group through the API.
    let (status, body) = send(
        &router,
        "GET",
        &format!("/api/deduplicate/groups/{group_id}"),
        Some(auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tweet_ids"].as_array().unwrap().len(), 2);

    // Tweet detail embeds the group.
    let (status, body) = send(&router, "GET", "/api/tweets/t1", Some(auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dedup_group"]["group_id"], group_id.as_str());
    assert!(body["tweet"]["dedup_group_id"].is_string());

    // Undo the grouping.
    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/api/deduplicate/groups/{group_id}"),
        Some(auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, "GET", "/api/tweets/t1", Some(auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tweet"]["dedup_group_id"].is_null());
}

#[tokio::test]
async fn summary_batch_passthrough_for_short_tweet() {
    let (router, pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;
    let auth_value = bearer(&token);
    let auth = ("Authorization", auth_value.as_str());

    // Short tweet: no LLM provider needed.
    storage::tweets::insert_tweets(
        &pool,
        &[storage::tweets::sample_tweet("s1", "alice", "tiny")],
    )
    .await
    .expect("seed");

    let (status, body) = send(
        &router,
        "POST",
        "/api/summaries/batch",
        Some(auth),
        Some(serde_json::json!({"tweet_ids": ["s1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().expect("task id").to_string();

    let task = wait_for_task(&router, auth, &task_id).await;
    assert_eq!(task["status"], "completed");

    let (status, body) = send(&router, "GET", "/api/summaries/tweets/s1", Some(auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary_text"], "tiny");
    assert_eq!(body["is_generated_summary"], false);
    assert_eq!(body["cost_usd"], 0.0);
    assert_eq!(body["total_tokens"], 0);

    // Stats reflect the zero-cost record.
    let (status, body) = send(&router, "GET", "/api/summaries/stats", Some(auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_cost_usd"], 0.0);
}

#[tokio::test]
async fn summary_for_unknown_tweet_is_404() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;

    let (status, _) = send(
        &router,
        "GET",
        "/api/summaries/tweets/missing",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        "POST",
        "/api/summaries/tweets/missing/regenerate",
        Some(("Authorization", &bearer(&token))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================
// User follows & filters
// ============================================================

#[tokio::test]
async fn user_follow_requires_active_scraper_follow() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;
    let auth_value = bearer(&token);
    let auth = ("Authorization", auth_value.as_str());

    // Not on the platform list yet.
    let (status, _) = send(
        &router,
        "POST",
        "/api/users/me/follows",
        Some(auth),
        Some(serde_json::json!({"username": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Add it as admin, then the user can follow.
    let (status, _) = send(
        &router,
        "POST",
        "/api/admin/scraping/follows",
        admin_auth(),
        Some(serde_json::json!({"username": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &router,
        "POST",
        "/api/users/me/follows",
        Some(auth),
        Some(serde_json::json!({"username": "alice", "priority": 8})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["priority"], 8);

    // Out-of-range priority rejected.
    let (status, _) = send(
        &router,
        "POST",
        "/api/users/me/follows",
        Some(auth),
        Some(serde_json::json!({"username": "alice", "priority": 11})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn filter_rules_crud() {
    let (router, _pool) = test_state(None).await;
    let token = login_user(&router, "user@example.com", false).await;
    let auth_value = bearer(&token);
    let auth = ("Authorization", auth_value.as_str());

    let (status, body) = send(
        &router,
        "POST",
        "/api/users/me/filters",
        Some(auth),
        Some(serde_json::json!({"filter_type": "keyword", "value": "rust"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let rule_id = body["id"].as_i64().expect("id");

    // Duplicate conflicts.
    let (status, _) = send(
        &router,
        "POST",
        "/api/users/me/filters",
        Some(auth),
        Some(serde_json::json!({"filter_type": "keyword", "value": "rust"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Unknown type rejected.
    let (status, _) = send(
        &router,
        "POST",
        "/api/users/me/filters",
        Some(auth),
        Some(serde_json::json!({"filter_type": "regex", "value": ".*"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&router, "GET", "/api/users/me/filters", Some(auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/api/users/me/filters/{rule_id}"),
        Some(auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
