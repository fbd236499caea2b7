//! Ordered provider chain with per-provider retry and fallback.
//!
//! Each provider gets at most two attempts: transient failures (429, 503,
//! 504, timeout, network) are retried once after a short delay, permanent
//! failures skip to the next provider immediately. The walk is a plain
//! loop over an outcome enum; no control flow via raised errors.

use std::time::Duration;

use super::{GenerationParams, LlmProvider, LlmResponse};
use crate::error::LlmError;

/// Per-1K-token USD rates for one provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRates {
    /// USD per 1K prompt tokens.
    pub rate_in: f64,
    /// USD per 1K completion tokens.
    pub rate_out: f64,
}

impl ProviderRates {
    /// Cost of a completion at these rates.
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        f64::from(prompt_tokens) / 1000.0 * self.rate_in
            + f64::from(completion_tokens) / 1000.0 * self.rate_out
    }
}

/// One provider in the chain, with its billing rates.
pub struct ChainEntry {
    /// The provider implementation.
    pub provider: Box<dyn LlmProvider>,
    /// Billing rates for cost accounting.
    pub rates: ProviderRates,
}

/// A completion that made it through the chain.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutedResponse {
    /// The generated text.
    pub content: String,
    /// Model that produced it.
    pub model: String,
    /// Provider that produced it.
    pub provider: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u32,
    /// Completion tokens produced.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
    /// Estimated cost in USD.
    pub cost_usd: f64,
}

/// Classification of a single failed attempt.
enum AttemptClass {
    /// Worth one retry on the same provider.
    Transient,
    /// Skip to the next provider immediately.
    Permanent,
}

fn classify(err: &LlmError) -> AttemptClass {
    match err {
        LlmError::RateLimited { .. } => AttemptClass::Transient,
        LlmError::Timeout { .. } => AttemptClass::Transient,
        LlmError::Request(_) => AttemptClass::Transient,
        LlmError::Api { status, .. } => match status {
            503 | 504 => AttemptClass::Transient,
            _ => AttemptClass::Permanent,
        },
        _ => AttemptClass::Permanent,
    }
}

/// Walks an ordered provider chain until one completes the prompt.
pub struct LlmRouter {
    chain: Vec<ChainEntry>,
    retry_delay: Duration,
}

impl LlmRouter {
    /// Create a router over the given chain (first entry tried first).
    pub fn new(chain: Vec<ChainEntry>) -> Self {
        Self {
            chain,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Override the transient-retry delay (used by tests).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Whether any provider is configured.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Provider names in chain order.
    pub fn provider_names(&self) -> Vec<String> {
        self.chain
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Complete a prompt via the first provider that succeeds.
    pub async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<RoutedResponse, LlmError> {
        if self.chain.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let mut failures: Vec<(String, String)> = Vec::new();

        for entry in &self.chain {
            let name = entry.provider.name().to_string();

            match self.attempt(entry, prompt, params).await {
                Ok(response) => return Ok(self.routed(entry, response)),
                Err((err, AttemptClass::Permanent)) => {
                    tracing::warn!(provider = %name, error = %err, "permanent provider failure, skipping");
                    failures.push((name, err.to_string()));
                }
                Err((err, AttemptClass::Transient)) => {
                    tracing::warn!(provider = %name, error = %err, "transient provider failure, retrying once");
                    tokio::time::sleep(self.retry_delay).await;
                    match self.attempt(entry, prompt, params).await {
                        Ok(response) => return Ok(self.routed(entry, response)),
                        Err((retry_err, _)) => {
                            tracing::warn!(provider = %name, error = %retry_err, "retry failed, moving to next provider");
                            failures.push((name, retry_err.to_string()));
                        }
                    }
                }
            }
        }

        Err(LlmError::AllProvidersFailed { chain: failures })
    }

    async fn attempt(
        &self,
        entry: &ChainEntry,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<LlmResponse, (LlmError, AttemptClass)> {
        entry
            .provider
            .complete(prompt, params)
            .await
            .map_err(|err| {
                let class = classify(&err);
                (err, class)
            })
    }

    fn routed(&self, entry: &ChainEntry, response: LlmResponse) -> RoutedResponse {
        let usage = response.usage;
        RoutedResponse {
            content: response.text,
            model: response.model,
            provider: entry.provider.name().to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total(),
            cost_usd: entry.rates.cost(usage.prompt_tokens, usage.completion_tokens),
        }
    }
}
