//! Default configuration values.
//!
//! Single source of truth for every tunable the environment does not set.

/// Default SQLite database path.
pub const DATABASE_URL: &str = "./data/xwatcher.db";

/// Default upstream tweet provider base URL.
pub const TWITTER_BASE_URL: &str = "https://api.twitterapi.io/twitter";

/// Default scrape interval (1 hour).
pub const SCRAPER_INTERVAL_SECONDS: i64 = 3600;

/// Minimum allowed scrape interval (5 minutes).
pub const MIN_INTERVAL_SECONDS: i64 = 300;

/// Maximum allowed scrape interval (7 days).
pub const MAX_INTERVAL_SECONDS: i64 = 604_800;

/// Fetch limit used for a username with no prior fetch statistics.
pub const DEFAULT_FETCH_LIMIT: u32 = 100;

/// Smallest adaptive fetch limit.
pub const MIN_FETCH_LIMIT: u32 = 10;

/// Largest adaptive fetch limit.
pub const MAX_FETCH_LIMIT: u32 = 300;

/// EMA smoothing factor for the new-tweet rate.
pub const NEW_RATE_ALPHA: f64 = 0.3;

/// Overshoot factor applied to the predicted fetch size.
pub const FETCH_SAFETY_MARGIN: f64 = 1.2;

/// Maximum concurrent per-user scrape fetches.
pub const MAX_CONCURRENT_SCRAPES: usize = 3;

/// Maximum concurrent LLM requests in the summariser worker pool.
pub const MAX_CONCURRENT_LLM_REQUESTS: usize = 5;

/// Maximum tweets per auto-summarisation batch.
pub const AUTO_SUMMARIZATION_BATCH_SIZE: usize = 50;

/// Tweets shorter than this many characters skip the LLM entirely.
pub const MIN_TWEET_LENGTH_FOR_SUMMARY: usize = 30;

/// Requested summary length lower bound, as a ratio of input length.
pub const SUMMARY_MIN_LENGTH_RATIO: f64 = 0.5;

/// Requested summary length upper bound, as a ratio of input length.
pub const SUMMARY_MAX_LENGTH_RATIO: f64 = 1.5;

/// Hard cap on generated summary length in characters.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Cosine similarity threshold for the similar-content dedup pass.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Default per-provider LLM request timeout.
pub const LLM_TIMEOUT_SECONDS: u64 = 30;

/// Default JWT lifetime.
pub const JWT_EXPIRE_HOURS: i64 = 24;

/// Default OpenRouter endpoint.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default OpenRouter model.
pub const OPENROUTER_MODEL: &str = "anthropic/claude-3.5-haiku";

/// OpenRouter USD per 1K prompt tokens.
pub const OPENROUTER_RATE_IN: f64 = 0.0008;

/// OpenRouter USD per 1K completion tokens.
pub const OPENROUTER_RATE_OUT: f64 = 0.004;

/// Default MiniMax endpoint.
pub const MINIMAX_BASE_URL: &str = "https://api.minimax.chat/v1";

/// Default MiniMax model.
pub const MINIMAX_MODEL: &str = "abab6.5s-chat";

/// MiniMax USD per 1K prompt tokens.
pub const MINIMAX_RATE_IN: f64 = 0.0002;

/// MiniMax USD per 1K completion tokens.
pub const MINIMAX_RATE_OUT: f64 = 0.0002;

/// Default model name for a self-hosted OpenAI-compatible endpoint.
pub const OPENSOURCE_MODEL: &str = "qwen2.5-7b-instruct";

/// Terminal task records older than this are swept from the registry.
pub const TASK_TTL_HOURS: i64 = 24;

/// Maximum filter rules per user.
pub const MAX_FILTER_RULES_PER_USER: i64 = 100;
