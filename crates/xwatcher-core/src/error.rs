//! Error types for the xwatcher core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing required config variable: {name}")]
    MissingVar {
        /// The name of the missing variable.
        name: String,
    },

    /// A configuration value is out of range or malformed.
    #[error("invalid value for config variable '{name}': {message}")]
    InvalidValue {
        /// The name of the invalid variable.
        name: String,
        /// A description of why the value is invalid.
        message: String,
    },
}

/// Errors from the upstream tweet provider.
#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    /// Provider API key was rejected (HTTP 401). Fatal, never retried.
    #[error("scraper provider authentication failed")]
    AuthFailed,

    /// Provider returned HTTP 429 (rate limited).
    #[error("scraper provider rate limited{}", match .retry_after {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying, if provided by the API.
        retry_after: Option<u64>,
    },

    /// Network-level failure communicating with the provider.
    #[error("scraper network error: {source}")]
    Network {
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// Provider response could not be parsed.
    #[error("failed to parse scraper response: {0}")]
    Parse(String),

    /// Username or limit failed input validation.
    #[error("invalid scrape request: {0}")]
    InvalidRequest(String),

    /// Retries exhausted on a retriable error class.
    #[error("scraper retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the final error.
        last_error: String,
    },

    /// Any other provider error response.
    #[error("scraper provider error (HTTP {status}): {message}")]
    ApiError {
        /// The HTTP status code.
        status: u16,
        /// The error message from the provider.
        message: String,
    },
}

/// Errors from interacting with LLM providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Request exceeded the provider's configured timeout.
    #[error("LLM request timed out after {seconds}s")]
    Timeout {
        /// The configured timeout in seconds.
        seconds: u64,
    },

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// LLM response could not be parsed.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// Every provider in the chain failed.
    #[error("all LLM providers failed: {}", .chain.iter().map(|(p, e)| format!("{p}: {e}")).collect::<Vec<_>>().join("; "))]
    AllProvidersFailed {
        /// Per-provider error descriptions in chain order.
        chain: Vec<(String, String)>,
    },

    /// No LLM provider configured.
    #[error("no LLM provider configured")]
    NotConfigured,
}

/// Errors from SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to the SQLite database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// A row failed to decode into its model type.
    #[error("row decode error: {message}")]
    Decode {
        /// Details of the decode failure.
        message: String,
    },
}

/// Errors from the deduplication engine.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The similarity pass failed; exact-pass groups were still committed.
    #[error("similarity pass failed: {0}")]
    SimilarityPass(String),
}

/// Errors from the in-memory task registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    /// No task exists with the given id.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The unknown task id.
        task_id: String,
    },

    /// The operation conflicts with the task's current state.
    #[error("task conflict: {message}")]
    Conflict {
        /// Why the operation was rejected.
        message: String,
    },
}

/// Errors from credential handling and token verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Password hashing or verification failed.
    #[error("password hash error: {message}")]
    Hash {
        /// Details of the bcrypt failure.
        message: String,
    },

    /// JWT is missing, malformed, expired, or signed with the wrong key.
    #[error("invalid token")]
    InvalidToken,

    /// Presented credentials do not match any account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Underlying storage failure during credential lookup.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from scheduler administration.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Interval outside the allowed `[300, 604800]` second range.
    #[error("interval out of range: {seconds}s (allowed 300..=604800)")]
    IntervalOutOfRange {
        /// The rejected interval.
        seconds: i64,
    },

    /// Requested one-shot run time is in the past or too far ahead.
    #[error("invalid next run time: {message}")]
    InvalidNextRun {
        /// Why the timestamp was rejected.
        message: String,
    },

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
