//! xwatcher HTTP API server.
//!
//! Exposes the core ingestion pipeline as a REST API: scrape jobs, tweet
//! and feed reads, deduplication, summaries, follow-list and schedule
//! administration, and user self-service.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the CORS layer from the configured origin list ("*" allows any).
fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(Any);

    if allowed_origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the complete axum router with all API routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Auth
        .route("/api/auth/login", post(routes::auth::login))
        // Scrape jobs
        .route(
            "/api/admin/scrape",
            post(routes::scrape::enqueue_scrape).get(routes::scrape::list_tasks),
        )
        .route(
            "/api/admin/scrape/{task_id}",
            get(routes::scrape::get_task).delete(routes::scrape::delete_task),
        )
        // Tweets
        .route("/api/tweets", get(routes::tweets::list_tweets))
        .route("/api/tweets/{tweet_id}", get(routes::tweets::get_tweet))
        // Feed
        .route("/api/feed", get(routes::feed::feed))
        // Deduplication
        .route("/api/deduplicate/batch", post(routes::dedup::enqueue_batch))
        .route(
            "/api/deduplicate/groups/{group_id}",
            get(routes::dedup::get_group).delete(routes::dedup::delete_group),
        )
        // Summaries
        .route("/api/summaries/batch", post(routes::summaries::enqueue_batch))
        .route(
            "/api/summaries/tweets/{tweet_id}",
            get(routes::summaries::get_summary),
        )
        .route(
            "/api/summaries/tweets/{tweet_id}/regenerate",
            post(routes::summaries::regenerate),
        )
        .route("/api/summaries/stats", get(routes::summaries::stats))
        // Platform follow list (admin)
        .route(
            "/api/admin/scraping/follows",
            get(routes::follows::list_follows).post(routes::follows::add_follow),
        )
        .route(
            "/api/admin/scraping/follows/{username}",
            put(routes::follows::update_follow).delete(routes::follows::remove_follow),
        )
        // Schedule control (admin)
        .route(
            "/api/admin/scraping/schedule",
            get(routes::schedule::get_schedule),
        )
        .route(
            "/api/admin/scraping/schedule/interval",
            put(routes::schedule::update_interval),
        )
        .route(
            "/api/admin/scraping/schedule/next-run",
            put(routes::schedule::set_next_run),
        )
        .route(
            "/api/admin/scraping/schedule/enable",
            post(routes::schedule::enable),
        )
        .route(
            "/api/admin/scraping/schedule/disable",
            post(routes::schedule::disable),
        )
        // User management (admin)
        .route(
            "/api/admin/users",
            post(routes::users::create_user).get(routes::users::list_users),
        )
        .route(
            "/api/admin/users/{id}/reset-password",
            post(routes::users::reset_password),
        )
        // Self-service
        .route("/api/users/me", get(routes::users::me))
        .route("/api/users/me/password", put(routes::users::change_password))
        .route(
            "/api/users/me/api-keys",
            post(routes::users::create_api_key).get(routes::users::list_own_api_keys),
        )
        .route(
            "/api/users/me/api-keys/{id}",
            delete(routes::users::delete_own_api_key),
        )
        .route(
            "/api/users/me/follows",
            post(routes::users::add_user_follow).get(routes::users::list_own_follows),
        )
        .route(
            "/api/users/me/follows/{username}",
            delete(routes::users::delete_own_follow),
        )
        .route(
            "/api/users/me/filters",
            post(routes::users::add_filter).get(routes::users::list_filters),
        )
        .route(
            "/api/users/me/filters/{id}",
            delete(routes::users::delete_filter),
        )
        // Operational endpoints (auth-exempt)
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::metrics::metrics))
        // Auth middleware; exempt paths are handled inside.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let cors = cors_layer(&state.config.cors_allowed_origins);

    api.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
