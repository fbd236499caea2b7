//! Service configuration loaded from environment variables.
//!
//! All settings come from the process environment. `Config::from_env()` is
//! the production entry point; `Config::from_lookup()` takes an arbitrary
//! key-value source so tests never mutate the real environment.

pub mod defaults;

use crate::error::ConfigError;

/// Settings for the upstream tweet provider and the scrape coordinator.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Provider API key, sent in the `X-API-Key` header.
    pub api_key: String,
    /// Provider base URL.
    pub base_url: String,
    /// Whether the periodic scraper job starts enabled.
    pub enabled: bool,
    /// Scrape interval in seconds.
    pub interval_seconds: i64,
    /// Default per-user fetch limit when no stats exist.
    pub default_limit: u32,
    /// Maximum concurrent per-user fetches.
    pub max_concurrent_scrapes: usize,
}

/// Settings for one LLM provider in the fallback chain.
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    /// Provider name used in summaries and logs (e.g. "openrouter").
    pub name: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// OpenAI-compatible base URL (without `/chat/completions`).
    pub base_url: String,
    /// Model identifier sent in the request body.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// USD per 1K prompt tokens.
    pub rate_in: f64,
    /// USD per 1K completion tokens.
    pub rate_out: f64,
}

/// Settings for the summarisation engine.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Whether new tweets are summarised automatically after a scrape.
    pub auto_enabled: bool,
    /// Maximum tweets per auto-summarisation batch; larger sets are split.
    pub auto_batch_size: usize,
    /// Maximum concurrent LLM requests.
    pub max_concurrent_requests: usize,
    /// Tweets shorter than this many characters are passed through unsummarised.
    pub min_tweet_length: usize,
    /// Lower bound of the requested summary length as a ratio of input length.
    pub min_length_ratio: f64,
    /// Upper bound of the requested summary length as a ratio of input length.
    pub max_length_ratio: f64,
}

/// Settings for the deduplication engine.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Cosine similarity threshold for the similar-content pass.
    pub similarity_threshold: f64,
}

/// Settings for authentication and token issuance.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for JWTs.
    pub jwt_secret: String,
    /// JWT lifetime in hours.
    pub jwt_expire_hours: i64,
    /// Process-wide bootstrap admin key (empty disables the bootstrap path).
    pub admin_api_key: String,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub database_url: String,
    /// Upstream scraper settings.
    pub scraper: ScraperConfig,
    /// Ordered LLM provider chain (first is tried first).
    pub llm_providers: Vec<LlmProviderConfig>,
    /// Summarisation settings.
    pub summarizer: SummarizerConfig,
    /// Deduplication settings.
    pub dedup: DedupConfig,
    /// Auth settings.
    pub auth: AuthConfig,
    /// Comma-separated CORS origins ("*" allows any).
    pub cors_allowed_origins: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key-value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name).ok_or_else(|| ConfigError::MissingVar {
                name: name.to_string(),
            })
        };

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| defaults::DATABASE_URL.to_string());

        let scraper = ScraperConfig {
            api_key: require("TWITTER_API_KEY")?,
            base_url: lookup("TWITTER_BASE_URL")
                .unwrap_or_else(|| defaults::TWITTER_BASE_URL.to_string()),
            enabled: parse_bool("SCRAPER_ENABLED", lookup("SCRAPER_ENABLED"), true)?,
            interval_seconds: parse_i64(
                "SCRAPER_INTERVAL",
                lookup("SCRAPER_INTERVAL"),
                defaults::SCRAPER_INTERVAL_SECONDS,
            )?,
            default_limit: parse_u32(
                "SCRAPER_LIMIT",
                lookup("SCRAPER_LIMIT"),
                defaults::DEFAULT_FETCH_LIMIT,
            )?,
            max_concurrent_scrapes: parse_usize(
                "MAX_CONCURRENT_SCRAPES",
                lookup("MAX_CONCURRENT_SCRAPES"),
                defaults::MAX_CONCURRENT_SCRAPES,
            )?,
        };

        if !(defaults::MIN_INTERVAL_SECONDS..=defaults::MAX_INTERVAL_SECONDS)
            .contains(&scraper.interval_seconds)
        {
            return Err(ConfigError::InvalidValue {
                name: "SCRAPER_INTERVAL".to_string(),
                message: format!(
                    "must be between {} and {} seconds",
                    defaults::MIN_INTERVAL_SECONDS,
                    defaults::MAX_INTERVAL_SECONDS
                ),
            });
        }

        let mut llm_providers = Vec::new();
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            llm_providers.push(LlmProviderConfig {
                name: "openrouter".to_string(),
                api_key: key,
                base_url: lookup("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|| defaults::OPENROUTER_BASE_URL.to_string()),
                model: lookup("OPENROUTER_MODEL")
                    .unwrap_or_else(|| defaults::OPENROUTER_MODEL.to_string()),
                timeout_seconds: defaults::LLM_TIMEOUT_SECONDS,
                rate_in: defaults::OPENROUTER_RATE_IN,
                rate_out: defaults::OPENROUTER_RATE_OUT,
            });
        }
        if let Some(key) = lookup("MINIMAX_API_KEY") {
            llm_providers.push(LlmProviderConfig {
                name: "minimax".to_string(),
                api_key: key,
                base_url: lookup("MINIMAX_BASE_URL")
                    .unwrap_or_else(|| defaults::MINIMAX_BASE_URL.to_string()),
                model: lookup("MINIMAX_MODEL")
                    .unwrap_or_else(|| defaults::MINIMAX_MODEL.to_string()),
                timeout_seconds: defaults::LLM_TIMEOUT_SECONDS,
                rate_in: defaults::MINIMAX_RATE_IN,
                rate_out: defaults::MINIMAX_RATE_OUT,
            });
        }
        if let Some(url) = lookup("OPENSOURCE_BASE_URL") {
            llm_providers.push(LlmProviderConfig {
                name: "opensource".to_string(),
                api_key: lookup("OPENSOURCE_API_KEY").unwrap_or_default(),
                base_url: url,
                model: lookup("OPENSOURCE_MODEL")
                    .unwrap_or_else(|| defaults::OPENSOURCE_MODEL.to_string()),
                timeout_seconds: defaults::LLM_TIMEOUT_SECONDS,
                // Self-hosted inference has no metered cost.
                rate_in: 0.0,
                rate_out: 0.0,
            });
        }

        let summarizer = SummarizerConfig {
            auto_enabled: parse_bool(
                "AUTO_SUMMARIZATION_ENABLED",
                lookup("AUTO_SUMMARIZATION_ENABLED"),
                true,
            )?,
            auto_batch_size: parse_usize(
                "AUTO_SUMMARIZATION_BATCH_SIZE",
                lookup("AUTO_SUMMARIZATION_BATCH_SIZE"),
                defaults::AUTO_SUMMARIZATION_BATCH_SIZE,
            )?,
            max_concurrent_requests: parse_usize(
                "MAX_CONCURRENT_LLM_REQUESTS",
                lookup("MAX_CONCURRENT_LLM_REQUESTS"),
                defaults::MAX_CONCURRENT_LLM_REQUESTS,
            )?,
            min_tweet_length: defaults::MIN_TWEET_LENGTH_FOR_SUMMARY,
            min_length_ratio: defaults::SUMMARY_MIN_LENGTH_RATIO,
            max_length_ratio: defaults::SUMMARY_MAX_LENGTH_RATIO,
        };

        let dedup = DedupConfig {
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
        };

        let auth = AuthConfig {
            jwt_secret: require("JWT_SECRET_KEY")?,
            jwt_expire_hours: parse_i64(
                "JWT_EXPIRE_HOURS",
                lookup("JWT_EXPIRE_HOURS"),
                defaults::JWT_EXPIRE_HOURS,
            )?,
            admin_api_key: lookup("ADMIN_API_KEY").unwrap_or_default(),
        };

        Ok(Self {
            database_url,
            scraper,
            llm_providers,
            summarizer,
            dedup,
            auth,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}

fn parse_i64(name: &str, value: Option<String>, default: i64) -> Result<i64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("expected an integer, got '{v}'"),
        }),
    }
}

fn parse_u32(name: &str, value: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("expected an unsigned integer, got '{v}'"),
        }),
    }
}

fn parse_usize(name: &str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("expected an unsigned integer, got '{v}'"),
        }),
    }
}
